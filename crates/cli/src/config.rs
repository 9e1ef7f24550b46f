// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! CLI configuration.
//!
//! Configuration lives in `tether.toml`, found by searching upward from the
//! working directory or named explicitly. It holds:
//! - `database`: path of the store database, relative to the config file
//! - `[[namespace]]`: prefixes and base URIs registered by `tether namespace sync`

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "tether.toml";
const DATA_DIR_NAME: &str = "tether";
const DB_FILE_NAME: &str = "sync.db";

/// Contents of `tether.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Store database; relative paths are resolved against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default, rename = "namespace", skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceConfig>,
    /// Where the config was read from.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

/// One `[[namespace]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceConfig {
    pub prefix: String,
    pub base_uri: String,
    pub type_namespace: String,
}

impl Config {
    /// Loads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] if the file does not exist and
    /// [`Error::InvalidConfig`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let mut config = Self::parse(path, &contents)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }

    /// Finds `tether.toml` in `start` or its nearest ancestor.
    pub fn find(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Loads the explicit config if given, else the nearest one above `cwd`.
    ///
    /// An explicit path must exist; a missing discovered config is not an error.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Option<Self>> {
        match explicit {
            Some(path) => Self::load(path).map(Some),
            None => Self::find(cwd).map(|path| Self::load(&path)).transpose(),
        }
    }

    /// The configured database path, resolved against the config file's directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        let database = self.database.as_ref()?;
        let base = self.path.as_deref().and_then(Path::parent);
        match base {
            Some(dir) if database.is_relative() => Some(dir.join(database)),
            _ => Some(database.clone()),
        }
    }
}

/// Resolves the store database.
///
/// Precedence: the `--database` flag, the config's `database`, `TETHER_DB`,
/// then `sync.db` under the platform data directory.
pub fn resolve_db_path(
    flag: Option<&Path>,
    config: Option<&Config>,
    env_db: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = config.and_then(Config::database_path) {
        return Ok(path);
    }
    if let Some(path) = env_db {
        return Ok(path);
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(DATA_DIR_NAME).join(DB_FILE_NAME))
        .ok_or(Error::NoDataDir)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
