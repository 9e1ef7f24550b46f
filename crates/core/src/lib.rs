// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: entity synchronization engine
//!
//! Providers expose CRUD operations on typed entities against a backend.
//! Raw records become entities through cached per-signature construction,
//! relationships resolve lazily through shared placeholders, and a
//! SQLite-backed [`Store`] de-duplicates entities and keeps run bookkeeping.

mod construct;
pub mod container;
pub mod context;
pub mod definition;
pub mod deferred;
pub mod entity;
pub mod error;
pub mod http;
pub mod introspect;
pub mod naming;
pub mod operation;
pub mod pipeline;
pub mod provider;
pub mod serialize;
pub mod store;
pub mod sync_error;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use container::{Container, ServiceContainer};
pub use context::{Conformity, Context, ListErrorPolicy};
pub use deferred::{DeferredEntity, DeferredList, ListSource, ResolutionState};
pub use definition::{DefinitionBuilder, SyncDefinition};
pub use entity::{
    Entity, EntityHandle, EntityId, EntityKey, EntityType, FieldDef, FieldKind, Hydration,
    Related, RelationKind, Relationship,
};
pub use error::{Error, Result};
pub use introspect::{EntityInfo, Introspector, ProviderInfo};
pub use operation::{EntityStream, OperationArgs, OperationOutput, SyncOperation};
pub use pipeline::Pipeline;
pub use provider::{MethodDecl, MethodOutput, Provider, SyncProvider};
pub use serialize::{serialize, RelationMode, SerializeRules};
pub use store::{Namespace, RunRecord, Store, StoreConfig};
pub use sync_error::{ErrorLevel, SyncError, SyncErrorRecord, SyncErrorType};

/// Performs `operation` on `entity_type` through `provider`.
///
/// Equivalent to [`SyncProvider::perform`]; kept as the crate's single
/// entry point for callers that hold providers generically.
pub fn perform_operation(
    provider: &Arc<SyncProvider>,
    entity_type: &str,
    operation: SyncOperation,
    ctx: &Context,
    args: OperationArgs,
) -> Result<OperationOutput> {
    provider.perform(entity_type, operation, ctx, args)
}
