// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

fn store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
        .register_namespace("acme", "https://schema.acme.test/", "acme")
        .unwrap();
    store
        .register_namespace("crm", "https://crm.test/types", "acme::crm")
        .unwrap();
    store
}

#[parameterized(
    top_level = { "acme::Task", "acme:Task\nhttps://schema.acme.test/Task\n" },
    nested_path = { "acme::billing::Invoice", "acme:billing/Invoice\nhttps://schema.acme.test/billing/Invoice\n" },
    longest_namespace = { "acme::crm::Lead", "crm:Lead\nhttps://crm.test/types/Lead\n" },
    trimmed = { " acme::Task ", "acme:Task\nhttps://schema.acme.test/Task\n" },
)]
fn test_uri(entity_type: &str, expected: &str) {
    let mut out = Vec::new();
    run_impl(&store(), entity_type, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn test_uri_without_namespace() {
    let mut out = Vec::new();
    let err = run_impl(&store(), "crm::Lead", &mut out).unwrap_err();
    assert!(matches!(err, Error::NoNamespace(ref t) if t == "crm::Lead"));
    assert!(out.is_empty());
}
