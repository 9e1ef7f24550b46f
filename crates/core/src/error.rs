// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tether-core operations.

use thiserror::Error;

use crate::operation::SyncOperation;
use crate::sync_error::{SyncError, SyncErrorType};

/// All possible errors that can occur in tether-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown entity type: {0}\n  hint: register the type with the introspector before use")]
    UnknownEntityType(String),

    #[error("entity type already registered: {0}")]
    DuplicateEntityType(String),

    #[error("invalid relationship {entity}.{property}: {reason}")]
    InvalidRelationship {
        entity: String,
        property: String,
        reason: String,
    },

    #[error("{entity}.{property} is declared more than once")]
    DuplicateProperty { entity: String, property: String },

    #[error("{entity} has no property '{property}'")]
    UnknownProperty { entity: String, property: String },

    #[error("ambiguous {operation} method for {entity}: {}\n  hint: declare exactly one method per operation or bind one explicitly", methods.join(", "))]
    AmbiguousOperationMethod {
        entity: String,
        operation: SyncOperation,
        methods: Vec<String>,
    },

    #[error("{provider} does not service {entity}")]
    EntityNotServiced { provider: String, entity: String },

    #[error("provider already registered in this session: {0}")]
    ProviderAlreadyRegistered(String),

    #[error("provider for {0} is no longer available")]
    ProviderUnavailable(String),

    #[error("{operation} is not supported for {entity} by {provider}")]
    OperationNotSupported {
        provider: String,
        entity: String,
        operation: SyncOperation,
    },

    #[error("call to undefined method {provider}::{method}()")]
    UndefinedMethod { provider: String, method: String },

    #[error("invalid operation: '{0}'\n  hint: valid operations are: create, read, update, delete, create_list, read_list, update_list, delete_list")]
    InvalidOperation(String),

    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments {
        operation: SyncOperation,
        reason: String,
    },

    #[error("circular reference: {0} is already being resolved on this call chain")]
    CircularReference(String),

    #[error("{0}")]
    Sync(SyncError),

    #[error("missing constructor argument {entity}.{field}")]
    MissingArgument { entity: String, field: String },

    #[error("invalid value for {entity}.{field}: expected {expected}")]
    InvalidFieldValue {
        entity: String,
        field: String,
        expected: String,
    },

    #[error("{entity} record has unclaimed fields: {}\n  hint: strict construction rejects fields it would discard", fields.join(", "))]
    DiscardedFields { entity: String, fields: Vec<String> },

    #[error("{entity}.{field} is read-only")]
    ReadOnlyField { entity: String, field: String },

    #[error("invalid record for {0}: expected a JSON object")]
    InvalidRecord(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("store is closed\n  hint: bookkeeping calls are rejected after close()")]
    StoreClosed,

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl Error {
    /// Configuration errors are raised at introspection time and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownEntityType(_)
                | Error::DuplicateEntityType(_)
                | Error::DuplicateProperty { .. }
                | Error::InvalidRelationship { .. }
                | Error::AmbiguousOperationMethod { .. }
                | Error::EntityNotServiced { .. }
                | Error::ProviderAlreadyRegistered(_)
        )
    }

    /// True for a missing entity, whether reported by the engine or by an HTTP backend.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Sync(err) => err.error_type == SyncErrorType::EntityNotFound,
            Error::Http { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Errors confined to a single record, which a batch may skip.
    ///
    /// Transport, storage and configuration failures are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Sync(_)
                | Error::CircularReference(_)
                | Error::MissingArgument { .. }
                | Error::InvalidFieldValue { .. }
                | Error::DiscardedFields { .. }
                | Error::ReadOnlyField { .. }
                | Error::InvalidRecord(_)
                | Error::Pipeline(_)
        ) || self.is_not_found()
    }
}

impl From<SyncError> for Error {
    fn from(err: SyncError) -> Self {
        Error::Sync(err)
    }
}

/// A specialized Result type for tether-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
