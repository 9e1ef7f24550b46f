// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-call-chain state threaded through operations.
//!
//! A [`Context`] is immutable. Every `with_*` method returns a new value, or
//! the same shared value when the change would be a no-op, so contexts can be
//! captured by deferred placeholders without copying.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::Container;
use crate::entity::{EntityHandle, EntityKey, Hydration, WeakHandle};
use crate::naming::snake_case;

/// How far a batch of records is known to share one field layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conformity {
    /// Signatures are computed from the sorted key set of every record.
    #[default]
    None,
    /// Records share key order; signatures skip sorting.
    Partial,
    /// Every record has the first record's layout; its closure is reused.
    Complete,
}

/// What a list operation does with a record that fails to resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListErrorPolicy {
    /// Yield the error at the point of consumption.
    #[default]
    Propagate,
    /// Record the error and drop the item.
    Skip,
}

#[derive(Clone, Default)]
struct ContextInner {
    container: Option<Weak<dyn Container>>,
    filters: BTreeMap<String, Value>,
    stack: Vec<EntityKey>,
    parent: Option<WeakHandle>,
    conformity: Conformity,
    hydration: Option<Hydration>,
    type_hydration: HashMap<String, Hydration>,
    list_errors: ListErrorPolicy,
    strict: bool,
}

#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when both values share the same underlying state.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn map(&self, f: impl FnOnce(&mut ContextInner)) -> Context {
        let mut inner = (*self.inner).clone();
        f(&mut inner);
        Context {
            inner: Arc::new(inner),
        }
    }

    pub fn with_container<C: Container + 'static>(&self, container: &Arc<C>) -> Context {
        let container: Arc<dyn Container> = Arc::clone(container) as Arc<dyn Container>;
        let weak = Arc::downgrade(&container);
        let same = self
            .inner
            .container
            .as_ref()
            .is_some_and(|c| std::ptr::addr_eq(c.as_ptr(), weak.as_ptr()));
        if same {
            return self.clone();
        }
        self.map(|inner| inner.container = Some(weak))
    }

    pub fn container(&self) -> Option<Arc<dyn Container>> {
        self.inner.container.as_ref().and_then(Weak::upgrade)
    }

    pub fn filters(&self) -> &BTreeMap<String, Value> {
        &self.inner.filters
    }

    pub fn filter(&self, key: &str) -> Option<&Value> {
        self.inner.filters.get(&snake_case(key))
    }

    pub fn with_filter(&self, key: &str, value: Value) -> Context {
        let key = snake_case(key);
        if self.inner.filters.get(&key) == Some(&value) {
            return self.clone();
        }
        self.map(|inner| {
            inner.filters.insert(key, value);
        })
    }

    /// Merges `filters` into the bag, normalizing keys.
    pub fn with_filters(&self, filters: &BTreeMap<String, Value>) -> Context {
        let unchanged = filters
            .iter()
            .all(|(k, v)| self.inner.filters.get(&snake_case(k)) == Some(v));
        if unchanged {
            return self.clone();
        }
        self.map(|inner| {
            for (k, v) in filters {
                inner.filters.insert(snake_case(k), v.clone());
            }
        })
    }

    pub fn without_filters(&self) -> Context {
        if self.inner.filters.is_empty() {
            return self.clone();
        }
        self.map(|inner| inner.filters.clear())
    }

    pub fn stack(&self) -> &[EntityKey] {
        &self.inner.stack
    }

    /// Pushes an in-flight entity onto the recursion stack.
    pub fn push(&self, entity: &EntityHandle) -> Context {
        match entity.key() {
            Some(key) => self.push_key(key),
            None => self.clone(),
        }
    }

    pub fn push_key(&self, key: EntityKey) -> Context {
        if self.inner.stack.last() == Some(&key) {
            return self.clone();
        }
        self.map(|inner| inner.stack.push(key))
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.inner.stack.contains(key)
    }

    /// The entity that children built under this context attach to.
    ///
    /// Held weakly: placeholders capture contexts and live inside the parent.
    pub fn parent(&self) -> Option<EntityHandle> {
        self.inner.parent.as_ref().and_then(WeakHandle::upgrade)
    }

    pub fn with_parent(&self, parent: Option<EntityHandle>) -> Context {
        let parent = parent.as_ref().map(EntityHandle::downgrade);
        let same = match (&self.inner.parent, &parent) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return self.clone();
        }
        self.map(|inner| inner.parent = parent)
    }

    pub fn conformity(&self) -> Conformity {
        self.inner.conformity
    }

    pub fn with_conformity(&self, conformity: Conformity) -> Context {
        if self.inner.conformity == conformity {
            return self.clone();
        }
        self.map(|inner| inner.conformity = conformity)
    }

    /// Overrides the hydration policy of every relationship.
    pub fn with_hydration(&self, hydration: Option<Hydration>) -> Context {
        if self.inner.hydration == hydration {
            return self.clone();
        }
        self.map(|inner| inner.hydration = hydration)
    }

    /// Overrides the hydration policy of relationships targeting `entity_type`.
    pub fn with_type_hydration(&self, entity_type: &str, hydration: Hydration) -> Context {
        if self.inner.type_hydration.get(entity_type) == Some(&hydration) {
            return self.clone();
        }
        self.map(|inner| {
            inner
                .type_hydration
                .insert(entity_type.to_string(), hydration);
        })
    }

    /// Effective policy for a relationship to `target` declared with `declared`.
    pub fn hydration_for(&self, target: &str, declared: Hydration) -> Hydration {
        self.inner
            .type_hydration
            .get(target)
            .copied()
            .or(self.inner.hydration)
            .unwrap_or(declared)
    }

    pub fn list_errors(&self) -> ListErrorPolicy {
        self.inner.list_errors
    }

    pub fn with_list_errors(&self, policy: ListErrorPolicy) -> Context {
        if self.inner.list_errors == policy {
            return self.clone();
        }
        self.map(|inner| inner.list_errors = policy)
    }

    pub fn strict(&self) -> bool {
        self.inner.strict
    }

    pub fn with_strict(&self, strict: bool) -> Context {
        if self.inner.strict == strict {
            return self.clone();
        }
        self.map(|inner| inner.strict = strict)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("filters", &self.inner.filters)
            .field("stack", &self.inner.stack)
            .field("conformity", &self.inner.conformity)
            .field("hydration", &self.inner.hydration)
            .field("list_errors", &self.inner.list_errors)
            .field("strict", &self.inner.strict)
            .finish()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
