// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_resolve_explicit_flags() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("custom.toml");
    fs::write(
        &config_path,
        "database = \"from-config.db\"\n\n[[namespace]]\nprefix = \"acme\"\nbase_uri = \"https://schema.acme.test/\"\ntype_namespace = \"acme\"\n",
    )
    .unwrap();
    let flag_db = temp.path().join("flag.db");

    let settings = Settings::resolve(Some(&config_path), Some(&flag_db)).unwrap();
    assert_eq!(settings.database, flag_db);
    let config = settings.config.unwrap();
    assert_eq!(config.namespaces.len(), 1);
    assert_eq!(config.path.as_deref(), Some(config_path.as_path()));
}

#[test]
fn test_resolve_database_from_config() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("tether.toml");
    fs::write(&config_path, "database = \"data/sync.db\"\n").unwrap();

    let settings = Settings::resolve(Some(&config_path), None).unwrap();
    assert_eq!(settings.database, temp.path().join("data/sync.db"));
}

#[test]
fn test_resolve_missing_explicit_config() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.toml");
    let err = Settings::resolve(Some(&missing), Some(&temp.path().join("sync.db"))).unwrap_err();
    assert!(matches!(err, crate::error::Error::ConfigNotFound(ref p) if p == &missing));
}

#[test]
fn test_open_store_creates_database() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        config: None,
        database: temp.path().join("sync.db"),
    };

    let store = settings.open_store().unwrap();
    assert!(settings.database.exists());
    assert!(store.run_uuid().is_none());
    assert!(store.list_runs(None).unwrap().is_empty());
}
