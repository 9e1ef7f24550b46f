// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Placeholders for related entities that have not been fetched yet.
//!
//! A placeholder moves from unresolved, through resolving, to resolved
//! exactly once. Every key has one [`Slot`] owned by the
//! [`Store`](crate::Store). Single-entity placeholders resolve through it and
//! list placeholders claim it for each member they fetch, so concurrent
//! readers of the same key coalesce onto one backend call and one
//! registration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::{Context, ListErrorPolicy};
use crate::entity::{EntityHandle, EntityId, EntityKey, Hydration};
use crate::error::{Error, Result};
use crate::operation::{OperationArgs, SyncOperation};
use crate::provider::SyncProvider;
use crate::sync_error::{SyncError, SyncErrorType};

/// Observable progress of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
}

/// Outcome of [`Slot::try_claim`].
pub(crate) enum SlotClaim<T> {
    Resolved(T),
    /// The caller now resolves the slot and must fulfil or release it.
    Claimed,
    /// Another thread is resolving it.
    Busy,
    /// The calling thread is already resolving it further up the stack.
    Reentrant,
}

enum SlotState<T> {
    Unresolved,
    Resolving(ThreadId),
    Resolved(T),
}

/// A resolve-once cell that parks other threads while one thread resolves it.
pub(crate) struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T: Clone> Slot<T> {
    pub(crate) fn new() -> Self {
        Slot {
            state: Mutex::new(SlotState::Unresolved),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn resolved(value: T) -> Self {
        Slot {
            state: Mutex::new(SlotState::Resolved(value)),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> ResolutionState {
        match &*self.state.lock() {
            SlotState::Unresolved => ResolutionState::Unresolved,
            SlotState::Resolving(_) => ResolutionState::Resolving,
            SlotState::Resolved(_) => ResolutionState::Resolved,
        }
    }

    pub(crate) fn peek(&self) -> Option<T> {
        match &*self.state.lock() {
            SlotState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Stores a value obtained elsewhere and wakes any waiters.
    pub(crate) fn fulfil(&self, value: T) {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Resolved(_)) {
            *state = SlotState::Resolved(value);
            self.ready.notify_all();
        }
    }

    /// Claims the slot for the calling thread without blocking.
    pub(crate) fn try_claim(&self) -> SlotClaim<T> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match &*state {
            SlotState::Resolved(value) => SlotClaim::Resolved(value.clone()),
            SlotState::Resolving(owner) if *owner == me => SlotClaim::Reentrant,
            SlotState::Resolving(_) => SlotClaim::Busy,
            SlotState::Unresolved => {
                *state = SlotState::Resolving(me);
                SlotClaim::Claimed
            }
        }
    }

    /// Gives up a claim that was not fulfilled and wakes any waiters.
    pub(crate) fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Resolving(owner) if owner == me) {
            *state = SlotState::Unresolved;
        }
        self.ready.notify_all();
    }

    /// Blocks while another thread resolves the slot. `None` if it gave up.
    pub(crate) fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                SlotState::Resolved(value) => return Some(value.clone()),
                SlotState::Unresolved => return None,
                SlotState::Resolving(_) => self.ready.wait(&mut state),
            }
        }
    }

    /// Resolves with `fetch` unless another caller already did.
    ///
    /// Re-entry from the resolving thread is a cycle and fails with
    /// [`Error::CircularReference`]. A failed fetch leaves the slot
    /// unresolved so it can be retried.
    pub(crate) fn resolve_with<F>(&self, label: &dyn Fn() -> String, fetch: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let me = thread::current().id();
        {
            let mut state = self.state.lock();
            loop {
                match &*state {
                    SlotState::Resolved(value) => return Ok(value.clone()),
                    SlotState::Resolving(owner) if *owner == me => {
                        return Err(Error::CircularReference(label()));
                    }
                    SlotState::Resolving(_) => self.ready.wait(&mut state),
                    SlotState::Unresolved => break,
                }
            }
            *state = SlotState::Resolving(me);
        }

        let result = fetch();
        let mut state = self.state.lock();
        let outcome = match result {
            Ok(value) => match &*state {
                SlotState::Resolved(existing) => Ok(existing.clone()),
                _ => {
                    *state = SlotState::Resolved(value.clone());
                    Ok(value)
                }
            },
            Err(err) => {
                if matches!(*state, SlotState::Resolving(_)) {
                    *state = SlotState::Unresolved;
                }
                Err(err)
            }
        };
        self.ready.notify_all();
        outcome
    }
}

struct DeferredEntityInner {
    provider: Weak<SyncProvider>,
    key: EntityKey,
    hydration: Hydration,
    context: Context,
    slot: Arc<Slot<EntityHandle>>,
}

/// A one-to-one relationship that has not been fetched.
#[derive(Clone)]
pub struct DeferredEntity {
    inner: Arc<DeferredEntityInner>,
}

impl DeferredEntity {
    pub(crate) fn new(
        provider: &Arc<SyncProvider>,
        entity_type: &str,
        id: EntityId,
        hydration: Hydration,
        context: &Context,
    ) -> Self {
        let key = EntityKey::new(provider.id(), entity_type, id);
        let slot = provider.store().slot(&key);
        DeferredEntity {
            inner: Arc::new(DeferredEntityInner {
                provider: Arc::downgrade(provider),
                key,
                hydration,
                context: context.clone(),
                slot,
            }),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.inner.key
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.key.id
    }

    pub fn hydration(&self) -> Hydration {
        self.inner.hydration
    }

    pub fn state(&self) -> ResolutionState {
        self.inner.slot.state()
    }

    /// The resolved entity, without triggering resolution.
    pub fn peek(&self) -> Option<EntityHandle> {
        self.inner.slot.peek()
    }

    /// Reads the value under the hydration policy.
    ///
    /// Suppressed placeholders read as absent until explicitly resolved.
    pub fn get(&self) -> Result<Option<EntityHandle>> {
        if self.inner.hydration == Hydration::Suppress {
            return Ok(self.peek());
        }
        self.resolve().map(Some)
    }

    /// Resolves regardless of the hydration policy.
    pub fn resolve(&self) -> Result<EntityHandle> {
        let inner = &self.inner;
        if let Some(handle) = inner.slot.peek() {
            return Ok(handle);
        }
        let provider = inner
            .provider
            .upgrade()
            .ok_or_else(|| Error::ProviderUnavailable(inner.key.entity_type.clone()))?;

        // Registered by another path since this placeholder was created.
        if let Some(handle) = provider.store().get_entity(&inner.key) {
            inner.slot.fulfil(handle.clone());
            return Ok(handle);
        }
        if inner.context.contains(&inner.key) {
            return Err(Error::CircularReference(inner.key.to_string()));
        }

        let label = || inner.key.to_string();
        inner.slot.resolve_with(&label, || {
            debug!(key = %inner.key, "resolving deferred entity");
            let ctx = inner
                .context
                .without_filters()
                .push_key(inner.key.clone());
            let args = OperationArgs::id(inner.key.id.clone());
            provider
                .perform(&inner.key.entity_type, SyncOperation::Read, &ctx, args)
                .and_then(|output| output.into_one())
                .map_err(|err| not_found(&provider, &inner.key.entity_type, &inner.key.id, err))
        })
    }

    /// Resolves now if eager, unless the key is already in flight.
    pub(crate) fn hydrate_eager(&self) -> Result<()> {
        if self.inner.hydration != Hydration::Eager
            || self.inner.context.contains(&self.inner.key)
            || self.state() != ResolutionState::Unresolved
        {
            return Ok(());
        }
        self.resolve().map(|_| ())
    }
}

impl fmt::Debug for DeferredEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEntity")
            .field("key", &self.inner.key)
            .field("hydration", &self.inner.hydration)
            .field("state", &self.state())
            .finish()
    }
}

/// What a list placeholder resolves from.
#[derive(Debug, Clone, PartialEq)]
pub enum ListSource {
    Ids(Vec<EntityId>),
    Filter(BTreeMap<String, Value>),
}

struct DeferredListInner {
    provider: Weak<SyncProvider>,
    entity_type: String,
    source: ListSource,
    hydration: Hydration,
    context: Context,
    slot: Slot<Vec<EntityHandle>>,
}

/// A one-to-many relationship that has not been fetched.
#[derive(Clone)]
pub struct DeferredList {
    inner: Arc<DeferredListInner>,
}

impl DeferredList {
    pub(crate) fn new(
        provider: &Arc<SyncProvider>,
        entity_type: &str,
        source: ListSource,
        hydration: Hydration,
        context: &Context,
    ) -> Self {
        DeferredList {
            inner: Arc::new(DeferredListInner {
                provider: Arc::downgrade(provider),
                entity_type: entity_type.to_string(),
                source,
                hydration,
                context: context.clone(),
                slot: Slot::new(),
            }),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.inner.entity_type
    }

    pub fn source(&self) -> &ListSource {
        &self.inner.source
    }

    pub fn hydration(&self) -> Hydration {
        self.inner.hydration
    }

    pub fn state(&self) -> ResolutionState {
        self.inner.slot.state()
    }

    pub fn peek(&self) -> Option<Vec<EntityHandle>> {
        self.inner.slot.peek()
    }

    /// Reads the list under the hydration policy.
    pub fn get(&self) -> Result<Vec<EntityHandle>> {
        if self.inner.hydration == Hydration::Suppress {
            return Ok(self.peek().unwrap_or_default());
        }
        self.resolve()
    }

    /// Resolves regardless of the hydration policy.
    pub fn resolve(&self) -> Result<Vec<EntityHandle>> {
        if let Some(list) = self.inner.slot.peek() {
            return Ok(list);
        }
        let provider = self
            .inner
            .provider
            .upgrade()
            .ok_or_else(|| Error::ProviderUnavailable(self.inner.entity_type.clone()))?;
        let label = || format!("{} list", self.inner.entity_type);
        self.inner.slot.resolve_with(&label, || match &self.inner.source {
            ListSource::Ids(ids) => self.fetch_ids(&provider, ids),
            ListSource::Filter(filter) => self.fetch_filter(&provider, filter),
        })
    }

    pub(crate) fn hydrate_eager(&self) -> Result<()> {
        if self.inner.hydration != Hydration::Eager || self.state() != ResolutionState::Unresolved {
            return Ok(());
        }
        self.resolve().map(|_| ())
    }

    fn fetch_filter(
        &self,
        provider: &Arc<SyncProvider>,
        filter: &BTreeMap<String, Value>,
    ) -> Result<Vec<EntityHandle>> {
        debug!(entity = %self.inner.entity_type, "resolving deferred list by filter");
        let args = OperationArgs {
            filters: filter.clone(),
            ..OperationArgs::default()
        };
        provider
            .perform(
                &self.inner.entity_type,
                SyncOperation::ReadList,
                &self.inner.context.without_filters(),
                args,
            )?
            .into_vec()
    }

    // Takes registered entities from the store and fetches the rest. Each
    // member goes through its key's slot, so a member already being fetched
    // by another placeholder is waited for instead of requested again.
    fn fetch_ids(
        &self,
        provider: &Arc<SyncProvider>,
        ids: &[EntityId],
    ) -> Result<Vec<EntityHandle>> {
        let entity_type = &self.inner.entity_type;
        let store = provider.store();

        let mut found: HashMap<EntityId, EntityHandle> = HashMap::new();
        let mut missing = Vec::new();
        let mut claimed = Vec::new();
        let mut busy = Vec::new();
        for id in ids {
            if found.contains_key(id) || missing.contains(id) {
                continue;
            }
            let slot = store.slot(&EntityKey::new(provider.id(), entity_type.as_str(), id.clone()));
            match slot.try_claim() {
                SlotClaim::Resolved(handle) => {
                    found.insert(id.clone(), handle);
                }
                SlotClaim::Claimed => {
                    missing.push(id.clone());
                    claimed.push(slot);
                }
                SlotClaim::Reentrant => missing.push(id.clone()),
                SlotClaim::Busy => busy.push((id.clone(), slot)),
            }
        }

        let fetched = self.fetch_missing(provider, &missing);
        // Registration fulfilled every slot whose member came back.
        for slot in &claimed {
            slot.release();
        }
        found.extend(fetched?);
        for (id, slot) in busy {
            if let Some(handle) = slot.wait() {
                found.insert(id, handle);
            }
        }

        let mut list = Vec::with_capacity(ids.len());
        for id in ids {
            match found.get(id) {
                Some(handle) => list.push(handle.clone()),
                None => {
                    let err = provider.report(
                        SyncError::new(
                            SyncErrorType::EntityNotFound,
                            format!("{entity_type} {id} not returned by backend"),
                        )
                        .with_entity(entity_type.as_str(), Some(id.clone())),
                    );
                    if self.inner.context.list_errors() == ListErrorPolicy::Propagate {
                        return Err(err);
                    }
                    warn!(entity = %entity_type, %id, "dropping missing list member");
                }
            }
        }
        Ok(list)
    }

    // One filtered list read, or one read per identifier when lists are
    // unsupported. Identifiers the backend does not return are left out.
    fn fetch_missing(
        &self,
        provider: &Arc<SyncProvider>,
        missing: &[EntityId],
    ) -> Result<HashMap<EntityId, EntityHandle>> {
        let entity_type = &self.inner.entity_type;
        let mut found = HashMap::new();
        if missing.is_empty() {
            return Ok(found);
        }
        debug!(entity = %entity_type, count = missing.len(), "resolving deferred list by id");
        let ctx = self.inner.context.without_filters();
        if provider.supports(entity_type, SyncOperation::ReadList)? {
            let filter = Value::Array(missing.iter().map(EntityId::to_value).collect());
            let args = OperationArgs::new().with_filter("id", filter);
            for handle in provider
                .perform(entity_type, SyncOperation::ReadList, &ctx, args)?
                .into_stream()
            {
                let handle = handle?;
                if let Some(id) = handle.id() {
                    found.insert(id, handle);
                }
            }
            return Ok(found);
        }
        for id in missing {
            let key = EntityKey::new(provider.id(), entity_type.as_str(), id.clone());
            match provider
                .perform(
                    entity_type,
                    SyncOperation::Read,
                    &ctx.push_key(key),
                    OperationArgs::id(id.clone()),
                )
                .and_then(|output| output.into_one())
            {
                Ok(handle) => {
                    found.insert(id.clone(), handle);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(found)
    }
}

impl fmt::Debug for DeferredList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredList")
            .field("entity_type", &self.inner.entity_type)
            .field("source", &self.inner.source)
            .field("state", &self.state())
            .finish()
    }
}

// Backend not-found failures become a recorded sync error naming the entity.
// Sync errors were recorded where they were raised.
fn not_found(provider: &SyncProvider, entity_type: &str, id: &EntityId, err: Error) -> Error {
    if matches!(err, Error::Sync(_)) || !err.is_not_found() {
        return err;
    }
    provider.report(
        SyncError::new(SyncErrorType::EntityNotFound, err.to_string())
            .with_entity(entity_type, Some(id.clone())),
    )
}

#[cfg(test)]
#[path = "deferred_tests.rs"]
mod tests;
