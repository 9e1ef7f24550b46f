// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity to JSON conversion.

use serde_json::{Map, Value};

use crate::deferred::ListSource;
use crate::entity::{EntityHandle, EntityId, Related};

/// How relationships are written out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationMode {
    /// Identifiers only.
    #[default]
    Ids,
    /// Resolved related entities are nested; unresolved ones are identifiers.
    Nested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeRules {
    pub relations: RelationMode,
    pub max_depth: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_meta: bool,
    pub include_children: bool,
}

impl Default for SerializeRules {
    fn default() -> Self {
        SerializeRules {
            relations: RelationMode::Ids,
            max_depth: 8,
            include: Vec::new(),
            exclude: Vec::new(),
            include_meta: false,
            include_children: false,
        }
    }
}

impl SerializeRules {
    pub fn nested() -> Self {
        SerializeRules {
            relations: RelationMode::Nested,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Restricts output to these properties (the identifier is always kept).
    pub fn with_include(mut self, properties: &[&str]) -> Self {
        self.include = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_exclude(mut self, properties: &[&str]) -> Self {
        self.exclude = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.include_meta = true;
        self
    }

    pub fn with_children(mut self) -> Self {
        self.include_children = true;
        self
    }

    fn keeps(&self, property: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|p| p == property))
            && !self.exclude.iter().any(|p| p == property)
    }
}

/// Serializes an entity under `rules`.
///
/// Placeholders are never resolved. An entity already on the current path,
/// or beyond `max_depth`, is written as its identifier.
pub fn serialize(handle: &EntityHandle, rules: &SerializeRules) -> Value {
    let mut path = Vec::new();
    walk(handle, rules, &mut path)
}

fn id_of(handle: &EntityHandle) -> Value {
    handle.id().map(|id| id.to_value()).unwrap_or(Value::Null)
}

fn walk(handle: &EntityHandle, rules: &SerializeRules, path: &mut Vec<*const ()>) -> Value {
    if path.contains(&handle.addr()) || path.len() > rules.max_depth {
        return id_of(handle);
    }

    // Copy out under the read lock; nested entities are read without holding it.
    let (id_field, id, values, relations, meta, children) = {
        let entity = handle.read();
        (
            entity.info().id_field().to_string(),
            entity.id().cloned(),
            entity.values().clone(),
            entity.relations.clone(),
            entity.meta().clone(),
            entity.children.clone(),
        )
    };

    path.push(handle.addr());
    let mut out = Map::new();
    out.insert(id_field, id.as_ref().map_or(Value::Null, EntityId::to_value));
    for (name, value) in values {
        if rules.keeps(&name) {
            out.insert(name, value);
        }
    }
    for (property, related) in relations {
        if rules.keeps(&property) {
            let value = relation_value(&related, rules, path);
            out.insert(property, value);
        }
    }
    if rules.include_meta {
        for (name, value) in meta {
            out.entry(name).or_insert(value);
        }
    }
    if rules.include_children {
        let children = children
            .iter()
            .filter_map(|w| w.upgrade())
            .map(|child| entity_value(&child, rules, path))
            .collect();
        out.insert("children".to_string(), Value::Array(children));
    }
    path.pop();
    Value::Object(out)
}

fn entity_value(handle: &EntityHandle, rules: &SerializeRules, path: &mut Vec<*const ()>) -> Value {
    match rules.relations {
        RelationMode::Ids => id_of(handle),
        RelationMode::Nested => walk(handle, rules, path),
    }
}

fn relation_value(related: &Related, rules: &SerializeRules, path: &mut Vec<*const ()>) -> Value {
    match related {
        Related::None => Value::Null,
        Related::One(handle) => entity_value(handle, rules, path),
        Related::Many(list) => {
            Value::Array(list.iter().map(|h| entity_value(h, rules, path)).collect())
        }
        Related::Deferred(deferred) => match deferred.peek() {
            Some(handle) => entity_value(&handle, rules, path),
            None => deferred.id().to_value(),
        },
        Related::DeferredList(list) => match (list.peek(), list.source()) {
            (Some(resolved), _) => {
                Value::Array(resolved.iter().map(|h| entity_value(h, rules, path)).collect())
            }
            (None, ListSource::Ids(ids)) => {
                Value::Array(ids.iter().map(EntityId::to_value).collect())
            }
            (None, ListSource::Filter(_)) => Value::Null,
        },
    }
}

#[cfg(test)]
#[path = "serialize_tests.rs"]
mod tests;
