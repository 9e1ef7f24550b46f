// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;

pub use predicates::prelude::*;
pub use tempfile::TempDir;
use tether_core::{Store, StoreConfig, SyncError};

/// A `tether` command run inside `temp`, with `TETHER_DB` pointing at its store.
pub fn tether(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.current_dir(temp.path())
        .env("TETHER_DB", db_path(temp))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

pub fn db_path(temp: &TempDir) -> PathBuf {
    temp.path().join("sync.db")
}

/// Opens the store the CLI reads, without opening a run.
pub fn open_store(temp: &TempDir) -> Store {
    Store::open(StoreConfig::new().with_path(db_path(temp))).unwrap()
}

/// Records a closed run with `errors` and returns its UUID.
pub fn record_run(
    temp: &TempDir,
    command: &str,
    errors: &[SyncError],
    exit_status: i32,
) -> String {
    let config = StoreConfig::new()
        .with_path(db_path(temp))
        .with_command(command, &[]);
    let store = Store::open(config).unwrap();
    // Runs open lazily on the first write; a run without errors needs one too.
    store.register_entity_type("acme::Task").unwrap();
    for error in errors {
        store.record_error(error, true).unwrap();
    }
    let uuid = store.run_uuid().unwrap().to_string();
    store.close(exit_status).unwrap();
    uuid
}

/// Writes `tether.toml` into `temp`.
pub fn write_config(temp: &TempDir, contents: &str) -> PathBuf {
    let path = temp.path().join("tether.toml");
    std::fs::write(&path, contents).unwrap();
    path
}
