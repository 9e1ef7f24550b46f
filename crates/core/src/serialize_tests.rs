// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;

use crate::test_support::{setup, TestEnv};

fn ada_with_grace(t: &TestEnv) -> EntityHandle {
    t.provider
        .provide(
            "acme::User",
            &t.ctx,
            json!({"id": 1, "name": "Ada", "manager": {"id": 2, "name": "Grace", "manager": 1}}),
        )
        .unwrap()
}

#[test]
fn ids_mode_writes_identifiers() {
    let t = setup();
    let ada = ada_with_grace(&t);
    assert_eq!(
        serialize(&ada, &SerializeRules::default()),
        json!({"id": 1, "name": "Ada", "manager": 2})
    );
}

#[test]
fn nested_mode_stops_at_entities_on_the_path() {
    let t = setup();
    let ada = ada_with_grace(&t);
    assert_eq!(
        serialize(&ada, &SerializeRules::nested()),
        json!({"id": 1, "name": "Ada", "manager": {"id": 2, "name": "Grace", "manager": 1}})
    );
}

#[test]
fn nested_mode_honors_max_depth() {
    let t = setup();
    let ada = ada_with_grace(&t);
    assert_eq!(
        serialize(&ada, &SerializeRules::nested().with_max_depth(0)),
        json!({"id": 1, "name": "Ada", "manager": 2})
    );
}

#[test]
fn placeholders_serialize_without_resolving() {
    let t = setup();
    let ada = t
        .provider
        .provide(
            "acme::User",
            &t.ctx,
            json!({"id": 1, "name": "Ada", "tasks": [5, 9], "manager": 2}),
        )
        .unwrap();

    assert_eq!(
        serialize(&ada, &SerializeRules::nested()),
        json!({"id": 1, "name": "Ada", "tasks": [5, 9], "manager": 2})
    );
    assert!(t.acme.calls().is_empty());
}

#[test]
fn unresolved_filter_lists_are_null() {
    let t = setup();
    let project = t
        .provider
        .provide("acme::Project", &t.ctx, json!({"id": 3, "name": "Launch"}))
        .unwrap();
    assert_eq!(
        serialize(&project, &SerializeRules::default()),
        json!({"id": 3, "name": "Launch", "tasks": null})
    );
}

#[test]
fn include_and_exclude_select_properties() {
    let t = setup();
    let ada = ada_with_grace(&t);

    assert_eq!(
        serialize(&ada, &SerializeRules::default().with_include(&["name"])),
        json!({"id": 1, "name": "Ada"})
    );
    assert_eq!(
        serialize(&ada, &SerializeRules::default().with_exclude(&["name"])),
        json!({"id": 1, "manager": 2})
    );
}

#[test]
fn meta_values_are_opt_in() {
    let t = setup();
    let folder = t
        .provider
        .provide("acme::Folder", &t.ctx, json!({"id": 1, "name": "root", "color": "red"}))
        .unwrap();

    assert_eq!(
        serialize(&folder, &SerializeRules::default()),
        json!({"id": 1, "name": "root"})
    );
    assert_eq!(
        serialize(&folder, &SerializeRules::default().with_meta()),
        json!({"id": 1, "name": "root", "color": "red"})
    );
}

#[test]
fn children_are_opt_in() {
    let t = setup();
    let root = t
        .provider
        .provide(
            "acme::Folder",
            &t.ctx,
            json!({"id": 1, "name": "root", "children": [{"id": 2, "name": "docs"}]}),
        )
        .unwrap();

    assert_eq!(
        serialize(&root, &SerializeRules::default().with_children()),
        json!({"id": 1, "name": "root", "children": [2]})
    );
    assert_eq!(
        serialize(&root, &SerializeRules::nested().with_children()),
        json!({
            "id": 1,
            "name": "root",
            "children": [{"id": 2, "name": "docs", "parent": 1, "children": []}]
        })
    );
}
