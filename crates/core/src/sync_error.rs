// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Typed synchronization errors recorded against a run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entity::EntityId;
use crate::error::Error;

/// The kind of problem a sync error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorType {
    EntityNotFound,
    EntityNotUnique,
    EntityNotExpected,
    EntityNotSupported,
    HierarchyIsCircular,
    EntityNotValid,
}

impl SyncErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorType::EntityNotFound => "entity_not_found",
            SyncErrorType::EntityNotUnique => "entity_not_unique",
            SyncErrorType::EntityNotExpected => "entity_not_expected",
            SyncErrorType::EntityNotSupported => "entity_not_supported",
            SyncErrorType::HierarchyIsCircular => "hierarchy_is_circular",
            SyncErrorType::EntityNotValid => "entity_not_valid",
        }
    }
}

impl fmt::Display for SyncErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncErrorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity_not_found" => Ok(SyncErrorType::EntityNotFound),
            "entity_not_unique" => Ok(SyncErrorType::EntityNotUnique),
            "entity_not_expected" => Ok(SyncErrorType::EntityNotExpected),
            "entity_not_supported" => Ok(SyncErrorType::EntityNotSupported),
            "hierarchy_is_circular" => Ok(SyncErrorType::HierarchyIsCircular),
            "entity_not_valid" => Ok(SyncErrorType::EntityNotValid),
            _ => Err(Error::CorruptedData(format!("unknown sync error type: {s}"))),
        }
    }
}

/// Severity of a recorded sync error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    #[default]
    Error,
    Warning,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Error => "error",
            ErrorLevel::Warning => "warning",
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resolution problem attributed to an entity and provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncError {
    pub error_type: SyncErrorType,
    pub level: ErrorLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<i64>,
}

impl SyncError {
    pub fn new(error_type: SyncErrorType, message: impl Into<String>) -> Self {
        SyncError {
            error_type,
            level: ErrorLevel::Error,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            provider_id: None,
        }
    }

    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, id: Option<EntityId>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = id;
        self
    }

    pub fn with_provider(mut self, provider_id: i64) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    /// SHA-256 of the serialized error, used to de-duplicate within a run.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.error_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.level.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.message.as_bytes());
        hasher.update([0]);
        if let Some(entity_type) = &self.entity_type {
            hasher.update(entity_type.as_bytes());
        }
        hasher.update([0]);
        if let Some(id) = &self.entity_id {
            hasher.update(id.to_string().as_bytes());
        }
        hasher.update([0]);
        if let Some(provider_id) = self.provider_id {
            hasher.update(provider_id.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error_type, self.level, self.message)?;
        if let Some(entity_type) = &self.entity_type {
            match &self.entity_id {
                Some(id) => write!(f, " [{entity_type}#{id}]")?,
                None => write!(f, " [{entity_type}]")?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

/// One entry of a run's error log; `count` tracks suppressed duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    #[serde(flatten)]
    pub error: SyncError,
    pub count: u32,
}

#[cfg(test)]
#[path = "sync_error_tests.rs"]
mod tests;
