// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Lookup of the provider responsible for an entity type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::provider::SyncProvider;

/// Supplies providers for entity types a provider does not service itself.
pub trait Container: Send + Sync {
    fn provider_for(&self, entity_type: &str) -> Option<Arc<SyncProvider>>;
}

/// A map-backed [`Container`].
#[derive(Default)]
pub struct ServiceContainer {
    bindings: RwLock<HashMap<String, Arc<SyncProvider>>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, entity_type: &str, provider: &Arc<SyncProvider>) {
        self.bindings
            .write()
            .insert(entity_type.to_string(), Arc::clone(provider));
    }

    /// Binds every entity type the provider services.
    pub fn bind_all(&self, provider: &Arc<SyncProvider>) {
        let mut bindings = self.bindings.write();
        for entity_type in provider.info().serviced_types() {
            bindings.insert(entity_type.to_string(), Arc::clone(provider));
        }
    }
}

impl Container for ServiceContainer {
    fn provider_for(&self, entity_type: &str) -> Option<Arc<SyncProvider>> {
        self.bindings.read().get(entity_type).cloned()
    }
}
