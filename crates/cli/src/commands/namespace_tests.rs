// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::config::NamespaceConfig;

fn namespace(prefix: &str, base_uri: &str, type_namespace: &str) -> NamespaceConfig {
    NamespaceConfig {
        prefix: prefix.to_string(),
        base_uri: base_uri.to_string(),
        type_namespace: type_namespace.to_string(),
    }
}

fn run(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> Result<String> {
    let mut out = Vec::new();
    f(&mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

#[test]
fn test_add_and_list() {
    let store = Store::open_in_memory().unwrap();
    let added =
        run(|out| add_impl(&store, "acme", "https://schema.acme.test/", "acme", out)).unwrap();
    assert_eq!(added, "Registered acme: acme -> https://schema.acme.test/\n");
    run(|out| add_impl(&store, "crm", "https://crm.test/types#", "acme::crm", out)).unwrap();

    let listed = run(|out| list_impl(&store, OutputFormat::Text, out)).unwrap();
    let lines: Vec<&str> = listed.lines().collect();
    // Longest type namespace first.
    assert!(lines[0].starts_with("crm "));
    assert!(lines[1].starts_with("acme "));
    assert!(store.run_uuid().is_none());
}

#[test]
fn test_list_empty() {
    let store = Store::open_in_memory().unwrap();
    assert_eq!(
        run(|out| list_impl(&store, OutputFormat::Text, out)).unwrap(),
        "No namespaces\n"
    );
}

#[test]
fn test_list_json() {
    let store = Store::open_in_memory().unwrap();
    store
        .register_namespace("acme", "https://schema.acme.test/", "acme")
        .unwrap();
    let json = run(|out| list_impl(&store, OutputFormat::Json, out)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(json.trim()).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "prefix": "acme",
            "base_uri": "https://schema.acme.test/",
            "type_namespace": "acme"
        })
    );
}

#[test]
fn test_add_rejects_invalid_prefix() {
    let store = Store::open_in_memory().unwrap();
    let err = run(|out| add_impl(&store, "9lives", "https://schema.acme.test/", "acme", out))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tether_core::Error::InvalidNamespace(_))
    ));
}

#[test]
fn test_sync_registers_config_namespaces() {
    let store = Store::open_in_memory().unwrap();
    let config = Config {
        namespaces: vec![
            namespace("acme", "https://schema.acme.test/", "acme"),
            namespace("crm", "https://crm.test/types#", "acme::crm"),
        ],
        ..Config::default()
    };

    let synced = run(|out| sync_impl(&store, Some(&config), out)).unwrap();
    assert_eq!(synced, "Registered 2 namespaces\n");
    assert_eq!(store.list_namespaces().unwrap().len(), 2);

    // Idempotent.
    run(|out| sync_impl(&store, Some(&config), out)).unwrap();
    assert_eq!(store.list_namespaces().unwrap().len(), 2);
}

#[test]
fn test_sync_without_namespaces() {
    let store = Store::open_in_memory().unwrap();
    assert!(matches!(
        run(|out| sync_impl(&store, None, out)),
        Err(Error::NoNamespaces)
    ));
    assert!(matches!(
        run(|out| sync_impl(&store, Some(&Config::default()), out)),
        Err(Error::NoNamespaces)
    ));
}

#[test]
fn test_sync_stops_at_invalid_namespace() {
    let store = Store::open_in_memory().unwrap();
    let config = Config {
        namespaces: vec![
            namespace("acme", "https://schema.acme.test/", "acme"),
            namespace("bad", "not a uri", "bad"),
        ],
        ..Config::default()
    };
    assert!(run(|out| sync_impl(&store, Some(&config), out)).is_err());
    assert_eq!(store.list_namespaces().unwrap().len(), 1);
}
