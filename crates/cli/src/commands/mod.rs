// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod namespace;
pub mod runs;
pub mod uri;

use std::path::{Path, PathBuf};

use tether_core::{Store, StoreConfig};

use crate::config::{resolve_db_path, Config};
use crate::env;
use crate::error::Result;

/// Configuration and database location shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Option<Config>,
    pub database: PathBuf,
}

impl Settings {
    /// Resolves the config file and store database from the global flags.
    pub fn resolve(config: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let config = Config::discover(config, &cwd)?;
        let database = resolve_db_path(database, config.as_ref(), env::tether_db())?;
        Ok(Settings { config, database })
    }

    /// Opens the store. Inspection never opens a run, so nothing is
    /// recorded for the CLI itself.
    pub fn open_store(&self) -> Result<Store> {
        tracing::debug!(database = %self.database.display(), "opening store");
        Ok(Store::open(StoreConfig::new().with_path(&self.database))?)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
