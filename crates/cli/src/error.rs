// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by the `tether` command line.
///
/// Messages carry a hint where the fix is obvious.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Core(#[from] tether_core::Error),

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid config {}: {message}", path.display())]
    InvalidConfig { path: PathBuf, message: String },

    #[error("no namespaces configured\n  hint: add [[namespace]] tables to tether.toml")]
    NoNamespaces,

    #[error("no namespace covers '{0}'\n  hint: register one with 'tether namespace add <prefix> <base_uri> <type_namespace>'")]
    NoNamespace(String),

    #[error("cannot locate a data directory\n  hint: set TETHER_DB or pass --database")]
    NoDataDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for tether CLI operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
