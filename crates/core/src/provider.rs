// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Backend adapters and the engine-side wrapper that drives them.
//!
//! Applications implement [`Provider`]; registering one yields a
//! [`SyncProvider`], which owns the provider's store identity, its cached
//! definitions and its dispatch table for conventionally named methods.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{Conformity, Context, ListErrorPolicy};
use crate::definition::{DefinitionBuilder, SyncDefinition};
use crate::entity::{EntityHandle, EntityId, EntityKey};
use crate::error::{Error, Result};
use crate::http::HttpBackend;
use crate::introspect::{Introspector, ProviderInfo};
use crate::operation::{
    EntityStream, OperationArgs, OperationClosure, OperationOutput, SyncOperation,
};
use crate::store::Store;
use crate::sync_error::{ErrorLevel, SyncError, SyncErrorType};

/// A method a provider implements, optionally bound to an operation.
///
/// Unbound methods are matched to operations by name (`get_user`,
/// `get_users`, `create_task`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub binding: Option<(String, SyncOperation)>,
}

impl MethodDecl {
    pub fn new(name: &str) -> Self {
        MethodDecl {
            name: name.to_string(),
            binding: None,
        }
    }

    pub fn bound(name: &str, entity_type: &str, operation: SyncOperation) -> Self {
        MethodDecl {
            name: name.to_string(),
            binding: Some((entity_type.to_string(), operation)),
        }
    }
}

/// What a declared method returns.
pub enum MethodOutput {
    Record(Value),
    Records(Box<dyn Iterator<Item = Result<Value>> + Send>),
    Entity(EntityHandle),
    Entities(Vec<EntityHandle>),
    /// Nothing came back: not found for reads, the given entity for deletes.
    Empty,
}

/// A backend adapter.
pub trait Provider: Send + Sync + 'static {
    /// Stable class-like name; part of the provider's identity.
    fn name(&self) -> &str;

    /// Values distinguishing backends served by the same provider kind.
    fn backend_identifier(&self) -> Vec<Value>;

    fn entity_types(&self) -> Vec<String>;

    fn methods(&self) -> Vec<MethodDecl> {
        Vec::new()
    }

    /// Invokes a declared method.
    fn call(&self, method: &str, _ctx: &Context, _args: &OperationArgs) -> Result<MethodOutput> {
        Err(Error::UndefinedMethod {
            provider: self.name().to_string(),
            method: method.to_string(),
        })
    }

    /// Customizes the definition of one entity type.
    fn define(&self, builder: DefinitionBuilder) -> DefinitionBuilder {
        builder
    }

    fn http(&self) -> Option<HttpBackend> {
        None
    }
}

/// A registered provider.
pub struct SyncProvider {
    inner: Arc<dyn Provider>,
    id: i64,
    hash: String,
    info: Arc<ProviderInfo>,
    store: Arc<Store>,
    introspector: Arc<Introspector>,
    http: Option<HttpBackend>,
    definitions: RwLock<HashMap<String, Arc<dyn SyncDefinition>>>,
    dispatch: RwLock<HashMap<String, OperationClosure>>,
}

impl SyncProvider {
    pub fn register<P: Provider>(
        provider: P,
        store: &Arc<Store>,
        introspector: &Arc<Introspector>,
    ) -> Result<Arc<Self>> {
        Self::register_arc(Arc::new(provider), store, introspector)
    }

    /// Registers with the store and builds the provider's dispatch tables.
    ///
    /// Registering the same (name, backend identifier) twice in one store
    /// session fails.
    pub fn register_arc(
        provider: Arc<dyn Provider>,
        store: &Arc<Store>,
        introspector: &Arc<Introspector>,
    ) -> Result<Arc<Self>> {
        let info = introspector.introspect_provider(provider.as_ref())?;
        let (id, hash) = store.register_provider(provider.name(), &provider.backend_identifier())?;
        let http = provider.http();
        info!(provider = provider.name(), id, "registered provider");
        Ok(Arc::new(SyncProvider {
            inner: provider,
            id,
            hash,
            info,
            store: Arc::clone(store),
            introspector: Arc::clone(introspector),
            http,
            definitions: RwLock::new(HashMap::new()),
            dispatch: RwLock::new(HashMap::new()),
        }))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn inner(&self) -> &Arc<dyn Provider> {
        &self.inner
    }

    pub fn info(&self) -> &Arc<ProviderInfo> {
        &self.info
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn introspector(&self) -> &Arc<Introspector> {
        &self.introspector
    }

    fn check_services(&self, entity_type: &str) -> Result<()> {
        if self.info.services(entity_type) {
            Ok(())
        } else {
            Err(Error::EntityNotServiced {
                provider: self.name().to_string(),
                entity: entity_type.to_string(),
            })
        }
    }

    /// The cached definition for `entity_type`.
    pub fn definition(&self, entity_type: &str) -> Result<Arc<dyn SyncDefinition>> {
        if let Some(definition) = self.definitions.read().get(entity_type) {
            return Ok(Arc::clone(definition));
        }
        self.check_services(entity_type)?;

        let entity = self.introspector.introspect(entity_type)?;
        let builder = self.inner.define(DefinitionBuilder::new(entity));
        let definition = builder.build(Arc::clone(&self.info), self.http.as_ref());
        debug!(provider = self.name(), entity = entity_type, "built definition");

        let mut definitions = self.definitions.write();
        let definition = definitions
            .entry(entity_type.to_string())
            .or_insert(definition);
        Ok(Arc::clone(definition))
    }

    pub fn supports(&self, entity_type: &str, operation: SyncOperation) -> Result<bool> {
        Ok(self.definition(entity_type)?.supports(operation))
    }

    /// Performs `operation` on `entity_type`.
    ///
    /// `args.filters` are claimed into the context. List results are lazy;
    /// errors surface while iterating unless the context skips them.
    pub fn perform(
        self: &Arc<Self>,
        entity_type: &str,
        operation: SyncOperation,
        ctx: &Context,
        args: OperationArgs,
    ) -> Result<OperationOutput> {
        self.check_services(entity_type)?;
        args.validate(operation)?;
        let entity_type_id = self.store.register_entity_type(entity_type)?;

        let ctx = ctx.with_filters(&args.filters);
        let closure = self
            .definition(entity_type)?
            .operation_closure(operation)
            .ok_or_else(|| Error::OperationNotSupported {
                provider: self.name().to_string(),
                entity: entity_type.to_string(),
                operation,
            })?;

        debug!(provider = self.name(), entity = entity_type, %operation, "performing operation");
        let output = closure(self, &ctx, args)?;
        self.store
            .touch_entity_type_state(self.id, entity_type_id, false)?;

        match output {
            OperationOutput::One(handle) => {
                if operation == SyncOperation::Delete {
                    self.mark_deleted(&handle)?;
                }
                Ok(OperationOutput::One(handle))
            }
            OperationOutput::Many(stream) => Ok(OperationOutput::Many(self.finish_stream(
                stream,
                operation,
                entity_type_id,
                &ctx,
            ))),
        }
    }

    fn mark_deleted(&self, handle: &EntityHandle) -> Result<()> {
        match handle.key() {
            Some(key) => self.store.mark_deleted(&key),
            None => Ok(()),
        }
    }

    // Applies the list error policy, marks deletions and records a full
    // sync once an unfiltered list read is drained without error.
    fn finish_stream(
        self: &Arc<Self>,
        stream: EntityStream,
        operation: SyncOperation,
        entity_type_id: i64,
        ctx: &Context,
    ) -> EntityStream {
        let provider = Arc::clone(self);
        let skip = ctx.list_errors() == ListErrorPolicy::Skip;
        let full_read = operation == SyncOperation::ReadList && ctx.filters().is_empty();
        let mut stream = stream;
        let mut failed = false;
        let mut done = false;

        EntityStream::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            loop {
                match stream.next() {
                    Some(Ok(handle)) => {
                        if operation == SyncOperation::DeleteList {
                            if let Err(err) = provider.mark_deleted(&handle) {
                                return Some(Err(err));
                            }
                        }
                        return Some(Ok(handle));
                    }
                    Some(Err(err)) if skip && err.is_recoverable() => {
                        failed = true;
                        provider.skip_error(&err);
                    }
                    Some(Err(err)) => {
                        failed = true;
                        return Some(Err(err));
                    }
                    None => {
                        done = true;
                        if full_read && !failed {
                            if let Err(err) =
                                provider
                                    .store
                                    .touch_entity_type_state(provider.id, entity_type_id, true)
                            {
                                return Some(Err(err));
                            }
                        }
                        return None;
                    }
                }
            }
        }))
    }

    fn skip_error(&self, err: &Error) {
        // Sync errors were recorded where they were raised.
        if !matches!(err, Error::Sync(_)) {
            self.report(
                SyncError::new(SyncErrorType::EntityNotValid, err.to_string())
                    .with_level(ErrorLevel::Warning),
            );
        }
        debug!(provider = self.name(), error = %err, "skipped list item");
    }

    /// Records a sync error against the current run and returns it as an [`Error`].
    pub fn report(&self, error: SyncError) -> Error {
        let error = error.with_provider(self.id);
        if let Err(err) = self.store.record_error(&error, true) {
            warn!(error = %err, "failed to record sync error");
        }
        Error::Sync(error)
    }

    /// Calls a conventionally named method (`get_user`, `create_tasks`, ...).
    pub fn invoke(
        self: &Arc<Self>,
        method: &str,
        ctx: &Context,
        args: OperationArgs,
    ) -> Result<OperationOutput> {
        let key = crate::naming::method_key(method);
        let cached = self.dispatch.read().get(&key).cloned();
        let closure = match cached {
            Some(closure) => closure,
            None => {
                let (entity, operation) =
                    self.info
                        .dispatch(method)
                        .ok_or_else(|| Error::UndefinedMethod {
                            provider: self.name().to_string(),
                            method: method.to_string(),
                        })?;
                let entity = entity.to_string();
                let closure: OperationClosure = Arc::new(move |provider, ctx, args| {
                    provider.perform(&entity, operation, ctx, args)
                });
                self.dispatch
                    .write()
                    .entry(key)
                    .or_insert(closure)
                    .clone()
            }
        };
        closure(self, ctx, args)
    }

    /// Builds (or updates) an entity from a raw record.
    pub fn provide(
        self: &Arc<Self>,
        entity_type: &str,
        ctx: &Context,
        record: Value,
    ) -> Result<EntityHandle> {
        let info = self.introspector.introspect(entity_type)?;
        let Value::Object(record) = record else {
            return Err(Error::InvalidRecord(entity_type.to_string()));
        };
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        let closure = self.introspector.create_closure(
            &info,
            &keys,
            ctx.strict(),
            ctx.conformity() != Conformity::Partial,
        )?;
        closure.apply(self, ctx, &record)
    }

    /// Lazily builds entities from a stream of records.
    ///
    /// Under [`Conformity::Complete`] the first record's closure is reused
    /// for the whole stream.
    pub fn provide_list<I>(
        self: &Arc<Self>,
        entity_type: &str,
        ctx: &Context,
        records: I,
    ) -> EntityStream
    where
        I: Iterator<Item = Result<Value>> + Send + 'static,
    {
        let provider = Arc::clone(self);
        let entity_type = entity_type.to_string();
        let ctx = ctx.clone();
        let mut shared = None;

        EntityStream::new(records.map(move |record| {
            let record = record?;
            if ctx.conformity() != Conformity::Complete {
                return provider.provide(&entity_type, &ctx, record);
            }
            let Value::Object(map) = record else {
                return Err(Error::InvalidRecord(entity_type.clone()));
            };
            let closure = match &shared {
                Some(closure) => Arc::clone(closure),
                None => {
                    let info = provider.introspector.introspect(&entity_type)?;
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    let closure = provider
                        .introspector
                        .create_closure(&info, &keys, ctx.strict(), true)?;
                    shared = Some(Arc::clone(&closure));
                    closure
                }
            };
            closure.apply(&provider, &ctx, &map)
        }))
    }

    /// The provider responsible for `entity_type`: this one if it services
    /// the type, otherwise the context's container.
    pub fn provider_for(
        self: &Arc<Self>,
        entity_type: &str,
        ctx: &Context,
    ) -> Result<Arc<SyncProvider>> {
        if self.info.services(entity_type) {
            return Ok(Arc::clone(self));
        }
        ctx.container()
            .and_then(|container| container.provider_for(entity_type))
            .ok_or_else(|| Error::EntityNotServiced {
                provider: self.name().to_string(),
                entity: entity_type.to_string(),
            })
    }

    /// Converts a declared method's return value into operation output.
    pub(crate) fn method_output(
        self: &Arc<Self>,
        entity_type: &str,
        operation: SyncOperation,
        ctx: &Context,
        output: MethodOutput,
        args: OperationArgs,
    ) -> Result<OperationOutput> {
        let ctx = ctx.with_conformity(if operation.is_list() {
            Conformity::Complete
        } else {
            ctx.conformity()
        });
        if operation.is_list() {
            let stream = match output {
                MethodOutput::Record(record) => {
                    self.provide_list(entity_type, &ctx, std::iter::once(Ok(record)))
                }
                MethodOutput::Records(records) => self.provide_list(entity_type, &ctx, records),
                MethodOutput::Entity(handle) => EntityStream::from_vec(vec![handle]),
                MethodOutput::Entities(handles) => EntityStream::from_vec(handles),
                MethodOutput::Empty if operation == SyncOperation::DeleteList => {
                    EntityStream::from_vec(args.entities)
                }
                MethodOutput::Empty => EntityStream::empty(),
            };
            return Ok(OperationOutput::Many(stream));
        }

        let handle = match output {
            MethodOutput::Record(record) => self.provide(entity_type, &ctx, record)?,
            MethodOutput::Entity(handle) => handle,
            MethodOutput::Records(records) => {
                let mut records = records;
                match records.next() {
                    Some(record) => self.provide(entity_type, &ctx, record?)?,
                    None => return Err(self.not_found(entity_type, args.id)),
                }
            }
            MethodOutput::Entities(handles) => match handles.into_iter().next() {
                Some(handle) => handle,
                None => return Err(self.not_found(entity_type, args.id)),
            },
            MethodOutput::Empty => match (operation, args.entity) {
                (SyncOperation::Delete, Some(handle)) => handle,
                (SyncOperation::Delete, None) => match args
                    .id
                    .as_ref()
                    .map(|id| EntityKey::new(self.id, entity_type, id.clone()))
                    .and_then(|key| self.store.get_entity(&key))
                {
                    Some(handle) => handle,
                    None => return Err(self.not_found(entity_type, args.id)),
                },
                (SyncOperation::Read, _) => return Err(self.not_found(entity_type, args.id)),
                (_, Some(handle)) => handle,
                (_, None) => {
                    return Err(Error::InvalidArguments {
                        operation,
                        reason: "method returned nothing".into(),
                    })
                }
            },
        };
        Ok(OperationOutput::One(handle))
    }

    fn not_found(&self, entity_type: &str, id: Option<EntityId>) -> Error {
        let message = match &id {
            Some(id) => format!("{} has no {entity_type} {id}", self.name()),
            None => format!("{} returned no {entity_type}", self.name()),
        };
        self.report(
            SyncError::new(SyncErrorType::EntityNotFound, message).with_entity(entity_type, id),
        )
    }
}

impl std::fmt::Debug for SyncProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProvider")
            .field("name", &self.name())
            .field("id", &self.id)
            .field("hash", &self.hash)
            .finish()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
