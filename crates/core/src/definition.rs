// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per (entity, provider) resolution of operations to executable closures.
//!
//! Resolution order, first match wins:
//!
//! 1. an override configured through [`DefinitionBuilder::with_override`]
//! 2. a method the provider declares for the operation
//! 3. for HTTP providers, the generic request/response composition
//!
//! Anything else is unsupported. Results, including "unsupported", are
//! cached per operation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::context::Context;
use crate::error::Result;
use crate::http::{Expiry, HttpBackend, HttpDefinition, HttpMethod, Pager};
use crate::introspect::{EntityInfo, ProviderInfo};
use crate::operation::{OperationArgs, OperationClosure, OperationOutput, SyncOperation};
use crate::pipeline::Pipeline;
use crate::provider::SyncProvider;
use crate::serialize::SerializeRules;

/// Extra query parameters computed per request.
pub type QueryFn = Arc<dyn Fn(&Context, SyncOperation) -> Vec<(String, String)> + Send + Sync>;

/// Executable operations for one entity type on one provider.
pub trait SyncDefinition: Send + Sync {
    fn entity(&self) -> &Arc<EntityInfo>;

    /// The closure for `operation`, or `None` when it is unsupported.
    fn operation_closure(&self, operation: SyncOperation) -> Option<OperationClosure>;

    fn supports(&self, operation: SyncOperation) -> bool {
        self.operation_closure(operation).is_some()
    }
}

/// Configuration a provider applies to the definition of each entity type.
pub struct DefinitionBuilder {
    entity: Arc<EntityInfo>,
    operations: BTreeSet<SyncOperation>,
    overrides: HashMap<SyncOperation, OperationClosure>,
    pub(crate) path: Option<String>,
    pub(crate) paths: HashMap<SyncOperation, String>,
    pub(crate) methods: HashMap<SyncOperation, HttpMethod>,
    pub(crate) query: Option<QueryFn>,
    pub(crate) expiry: Option<Expiry>,
    pub(crate) pager: Option<Arc<dyn Pager>>,
    pub(crate) to_backend: Pipeline<Value>,
    pub(crate) from_backend: Pipeline<Value>,
    pub(crate) rules: SerializeRules,
}

impl DefinitionBuilder {
    pub(crate) fn new(entity: Arc<EntityInfo>) -> Self {
        DefinitionBuilder {
            entity,
            operations: SyncOperation::ALL.into_iter().collect(),
            overrides: HashMap::new(),
            path: None,
            paths: HashMap::new(),
            methods: HashMap::new(),
            query: None,
            expiry: None,
            pager: None,
            to_backend: Pipeline::new(),
            from_backend: Pipeline::new(),
            rules: SerializeRules::default(),
        }
    }

    pub fn entity(&self) -> &Arc<EntityInfo> {
        &self.entity
    }

    /// Limits the definition to these operations.
    pub fn with_operations(mut self, operations: &[SyncOperation]) -> Self {
        self.operations = operations.iter().copied().collect();
        self
    }

    pub fn with_override<F>(mut self, operation: SyncOperation, closure: F) -> Self
    where
        F: Fn(&Arc<SyncProvider>, &Context, OperationArgs) -> Result<OperationOutput>
            + Send
            + Sync
            + 'static,
    {
        self.overrides.insert(operation, Arc::new(closure));
        self
    }

    /// Resource path relative to the backend URL; `:id` marks the identifier.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_operation_path(mut self, operation: SyncOperation, path: &str) -> Self {
        self.paths.insert(operation, path.to_string());
        self
    }

    pub fn with_method(mut self, operation: SyncOperation, method: HttpMethod) -> Self {
        self.methods.insert(operation, method);
        self
    }

    pub fn with_query<F>(mut self, query: F) -> Self
    where
        F: Fn(&Context, SyncOperation) -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.query = Some(Arc::new(query));
        self
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_pager(mut self, pager: Arc<dyn Pager>) -> Self {
        self.pager = Some(pager);
        self
    }

    /// Applied to serialized entities before they are sent.
    pub fn with_to_backend(mut self, pipeline: Pipeline<Value>) -> Self {
        self.to_backend = pipeline;
        self
    }

    /// Applied to backend records before entities are built from them.
    pub fn with_from_backend(mut self, pipeline: Pipeline<Value>) -> Self {
        self.from_backend = pipeline;
        self
    }

    pub fn with_rules(mut self, rules: SerializeRules) -> Self {
        self.rules = rules;
        self
    }

    pub(crate) fn build(
        self,
        provider: Arc<ProviderInfo>,
        backend: Option<&HttpBackend>,
    ) -> Arc<dyn SyncDefinition> {
        let base = DefinitionBase {
            entity: Arc::clone(&self.entity),
            provider,
            operations: self.operations.clone(),
            overrides: self.overrides.clone(),
            closures: RwLock::new(HashMap::new()),
        };
        match (self.path.is_some(), backend) {
            (true, Some(backend)) => Arc::new(HttpDefinition::new(base, backend.clone(), self)),
            _ => Arc::new(EntityDefinition { base }),
        }
    }
}

/// Resolution shared by every definition kind.
pub(crate) struct DefinitionBase {
    entity: Arc<EntityInfo>,
    provider: Arc<ProviderInfo>,
    operations: BTreeSet<SyncOperation>,
    overrides: HashMap<SyncOperation, OperationClosure>,
    closures: RwLock<HashMap<SyncOperation, Option<OperationClosure>>>,
}

impl DefinitionBase {
    pub(crate) fn entity(&self) -> &Arc<EntityInfo> {
        &self.entity
    }

    pub(crate) fn resolve<F>(
        &self,
        operation: SyncOperation,
        generic: F,
    ) -> Option<OperationClosure>
    where
        F: FnOnce() -> Option<OperationClosure>,
    {
        if let Some(closure) = self.closures.read().get(&operation) {
            return closure.clone();
        }

        let entity = self.entity.name();
        let (closure, source) = if !self.operations.contains(&operation) {
            (None, "disabled")
        } else if let Some(closure) = self.overrides.get(&operation) {
            (Some(Arc::clone(closure)), "override")
        } else if let Some(method) = self.provider.operation_method(entity, operation) {
            (Some(declared(method, entity, operation)), "declared")
        } else {
            let closure = generic();
            let source = if closure.is_some() { "generic" } else { "unsupported" };
            (closure, source)
        };
        debug!(
            entity,
            provider = self.provider.name(),
            %operation,
            source,
            "resolved operation closure"
        );

        self.closures
            .write()
            .entry(operation)
            .or_insert(closure)
            .clone()
    }
}

fn declared(method: &str, entity: &str, operation: SyncOperation) -> OperationClosure {
    let method = method.to_string();
    let entity = entity.to_string();
    Arc::new(move |provider, ctx, args| {
        let output = provider.inner().call(&method, ctx, &args)?;
        provider.method_output(&entity, operation, ctx, output, args)
    })
}

/// Definition for providers without an HTTP path: overrides and declared methods only.
pub struct EntityDefinition {
    base: DefinitionBase,
}

impl SyncDefinition for EntityDefinition {
    fn entity(&self) -> &Arc<EntityInfo> {
        self.base.entity()
    }

    fn operation_closure(&self, operation: SyncOperation) -> Option<OperationClosure> {
        self.base.resolve(operation, || None)
    }
}

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;
