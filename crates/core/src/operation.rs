// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync operations, their arguments and their results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::entity::{EntityHandle, EntityId};
use crate::error::{Error, Result};
use crate::provider::SyncProvider;

/// A CRUD operation, singular or list-oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Read,
    Update,
    Delete,
    CreateList,
    ReadList,
    UpdateList,
    DeleteList,
}

impl SyncOperation {
    pub const ALL: [SyncOperation; 8] = [
        SyncOperation::Create,
        SyncOperation::Read,
        SyncOperation::Update,
        SyncOperation::Delete,
        SyncOperation::CreateList,
        SyncOperation::ReadList,
        SyncOperation::UpdateList,
        SyncOperation::DeleteList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Create => "create",
            SyncOperation::Read => "read",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
            SyncOperation::CreateList => "create_list",
            SyncOperation::ReadList => "read_list",
            SyncOperation::UpdateList => "update_list",
            SyncOperation::DeleteList => "delete_list",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            SyncOperation::CreateList
                | SyncOperation::ReadList
                | SyncOperation::UpdateList
                | SyncOperation::DeleteList
        )
    }

    /// The single-entity counterpart of a list operation.
    pub fn singular(&self) -> SyncOperation {
        match self {
            SyncOperation::CreateList => SyncOperation::Create,
            SyncOperation::ReadList => SyncOperation::Read,
            SyncOperation::UpdateList => SyncOperation::Update,
            SyncOperation::DeleteList => SyncOperation::Delete,
            op => *op,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s.to_lowercase().replace('-', "_"))
            .ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// Arguments passed to an operation.
#[derive(Debug, Clone, Default)]
pub struct OperationArgs {
    pub id: Option<EntityId>,
    pub entity: Option<EntityHandle>,
    pub entities: Vec<EntityHandle>,
    /// Claimed into the context's filter bag before the operation runs.
    pub filters: BTreeMap<String, Value>,
}

impl OperationArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: impl Into<EntityId>) -> Self {
        OperationArgs {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn entity(entity: EntityHandle) -> Self {
        OperationArgs {
            entity: Some(entity),
            ..Self::default()
        }
    }

    pub fn entities(entities: Vec<EntityHandle>) -> Self {
        OperationArgs {
            entities,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filters.insert(key.to_string(), value);
        self
    }

    /// Checks the argument shape an operation requires.
    pub fn validate(&self, operation: SyncOperation) -> Result<()> {
        let invalid = |reason: &str| {
            Err(Error::InvalidArguments {
                operation,
                reason: reason.to_string(),
            })
        };
        match operation {
            SyncOperation::Create | SyncOperation::Update if self.entity.is_none() => {
                invalid("an entity is required")
            }
            SyncOperation::Read if self.id.is_none() && self.filters.is_empty() => {
                invalid("an identifier or filter is required")
            }
            SyncOperation::Delete if self.id.is_none() && self.entity.is_none() => {
                invalid("an identifier or entity is required")
            }
            op if op.is_list() && (self.id.is_some() || self.entity.is_some()) => {
                invalid("list operations take no single identifier or entity")
            }
            SyncOperation::ReadList if !self.entities.is_empty() => {
                invalid("read_list takes no entities")
            }
            op if !op.is_list() && !self.entities.is_empty() => {
                invalid("entity lists require a list operation")
            }
            _ => Ok(()),
        }
    }
}

/// A lazy stream of entities produced by a list operation.
///
/// Errors surface at the item where they occur.
pub struct EntityStream(Box<dyn Iterator<Item = Result<EntityHandle>> + Send>);

impl EntityStream {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<EntityHandle>> + Send + 'static,
    {
        EntityStream(Box::new(iter))
    }

    pub fn empty() -> Self {
        EntityStream::new(std::iter::empty())
    }

    pub fn from_vec(entities: Vec<EntityHandle>) -> Self {
        EntityStream::new(entities.into_iter().map(Ok))
    }
}

impl Iterator for EntityStream {
    type Item = Result<EntityHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl fmt::Debug for EntityStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityStream")
    }
}

/// Result of performing an operation.
#[derive(Debug)]
pub enum OperationOutput {
    One(EntityHandle),
    Many(EntityStream),
}

impl OperationOutput {
    pub fn into_one(self) -> Result<EntityHandle> {
        match self {
            OperationOutput::One(handle) => Ok(handle),
            OperationOutput::Many(_) => Err(Error::Pipeline(
                "expected a single entity, got a stream".into(),
            )),
        }
    }

    pub fn into_stream(self) -> EntityStream {
        match self {
            OperationOutput::One(handle) => EntityStream::from_vec(vec![handle]),
            OperationOutput::Many(stream) => stream,
        }
    }

    /// Drains the output, stopping at the first error.
    pub fn into_vec(self) -> Result<Vec<EntityHandle>> {
        self.into_stream().collect()
    }
}

/// Executable form of an operation for one entity type.
pub type OperationClosure = Arc<
    dyn Fn(&Arc<SyncProvider>, &Context, OperationArgs) -> Result<OperationOutput> + Send + Sync,
>;

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
