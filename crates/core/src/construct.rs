// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Signature-specialized conversion of raw records into entities.
//!
//! A [`CreateClosure`] is built once per (entity type, strictness, key set)
//! by the [`Introspector`](crate::Introspector). Building partitions the keys
//! into identity, fields, relationships, meta and discarded keys; applying
//! the closure to a record then does no further key analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::context::Context;
use crate::deferred::{DeferredEntity, DeferredList, ListSource};
use crate::entity::{
    Entity, EntityHandle, EntityId, EntityKey, FieldDef, RelationRole, Related, Relationship,
};
use crate::error::{Error, Result};
use crate::introspect::{Claim, EntityInfo};
use crate::naming::snake_case;
use crate::provider::SyncProvider;
use crate::sync_error::{SyncError, SyncErrorType};

pub(crate) struct CreateClosure {
    info: Arc<EntityInfo>,
    id_key: Option<String>,
    fields: Vec<(String, FieldDef)>,
    relations: Vec<(String, usize, bool)>,
    meta: Vec<(String, String)>,
    defaults: Vec<(String, Value)>,
    missing: Vec<String>,
    inverse: Vec<usize>,
}

enum ParentValue {
    Link(EntityHandle),
    Pending(Related),
}

impl CreateClosure {
    pub(crate) fn build(info: &Arc<EntityInfo>, keys: &[&str], strict: bool) -> Result<Self> {
        let mut id_key = None;
        let mut fields = Vec::new();
        let mut relations = Vec::new();
        let mut meta = Vec::new();
        let mut discarded = Vec::new();

        for &key in keys {
            match info.claim(key) {
                Claim::Id => id_key = Some(key.to_string()),
                Claim::Field(field) => fields.push((key.to_string(), field.clone())),
                Claim::Relationship { index, ids_only } => {
                    relations.push((key.to_string(), index, ids_only))
                }
                Claim::Meta => meta.push((key.to_string(), snake_case(key))),
                Claim::Unclaimed => discarded.push(key.to_string()),
            }
        }

        if strict && !discarded.is_empty() {
            return Err(Error::DiscardedFields {
                entity: info.name().to_string(),
                fields: discarded,
            });
        }

        let present: BTreeSet<&str> = fields.iter().map(|(_, f)| f.name.as_str()).collect();
        let mut defaults = Vec::new();
        let mut missing = Vec::new();
        for field in info.fields().iter().filter(|f| f.constructor) {
            if present.contains(field.name.as_str()) {
                continue;
            }
            match &field.default {
                Some(value) => defaults.push((field.name.clone(), value.clone())),
                None => missing.push(field.name.clone()),
            }
        }

        let claimed: BTreeSet<usize> = relations.iter().map(|(_, i, _)| *i).collect();
        let inverse = info
            .relationships()
            .iter()
            .enumerate()
            .filter(|(i, rel)| rel.inverse.is_some() && !claimed.contains(i))
            .map(|(i, _)| i)
            .collect();

        Ok(CreateClosure {
            info: Arc::clone(info),
            id_key,
            fields,
            relations,
            meta,
            defaults,
            missing,
            inverse,
        })
    }

    /// Converts `record`, updating the registered instance when one exists.
    pub(crate) fn apply(
        &self,
        provider: &Arc<SyncProvider>,
        ctx: &Context,
        record: &Map<String, Value>,
    ) -> Result<EntityHandle> {
        let info = &self.info;
        let store = provider.store();
        let id = self.extract_id(record)?;
        let key = id
            .clone()
            .map(|id| EntityKey::new(provider.id(), info.name(), id));
        let ctx = match &key {
            Some(key) => ctx.push_key(key.clone()),
            None => ctx.clone(),
        };

        let (handle, is_new) = match key.as_ref().and_then(|k| store.get_entity(k)) {
            Some(existing) => (existing, false),
            None => {
                if let Some(field) = self.missing.first() {
                    return Err(Error::MissingArgument {
                        entity: info.name().to_string(),
                        field: field.clone(),
                    });
                }
                let mut entity = Entity::new(Arc::clone(info));
                entity.id = id.clone();
                entity.provider_id = Some(provider.id());
                let fresh = EntityHandle::new(entity);
                match &key {
                    // Another build of the same key may have won the claim.
                    Some(key) => store.claim_entity(key, fresh),
                    None => (fresh, true),
                }
            }
        };

        if let Err(err) = self.fill(provider, &ctx, record, &handle, id.as_ref(), is_new) {
            if let (true, Some(key)) = (is_new, &key) {
                store.release_entity(key, &handle);
            }
            return Err(err);
        }

        if key.is_some() {
            store.set_entity(&handle)?;
        }

        hydrate_eager(&handle)?;
        Ok(handle)
    }

    fn fill(
        &self,
        provider: &Arc<SyncProvider>,
        ctx: &Context,
        record: &Map<String, Value>,
        handle: &EntityHandle,
        id: Option<&EntityId>,
        is_new: bool,
    ) -> Result<()> {
        let info = &self.info;
        let values = self.values(ctx, record, is_new)?;

        let plain_ctx = ctx.with_parent(None);
        let mut relations = Vec::new();
        let mut parent = None;
        for (raw, index, ids_only) in &self.relations {
            let Some(value) = record.get(raw) else {
                continue;
            };
            let rel = info.relationship_at(*index);
            match rel.role {
                RelationRole::Parent => {
                    let own_key = handle.key();
                    parent = Some(self.relate_parent(
                        provider,
                        &plain_ctx,
                        rel,
                        value,
                        handle,
                        own_key.as_ref(),
                    )?);
                }
                RelationRole::Children => {
                    let child_ctx = ctx.with_parent(Some(handle.clone()));
                    let related = self.relate(provider, &child_ctx, rel, value, *ids_only)?;
                    // Inline children link themselves to this entity.
                    if let Related::DeferredList(_) = related {
                        relations.push((rel.property.clone(), related));
                    }
                }
                RelationRole::Plain => {
                    let related = self.relate(provider, &plain_ctx, rel, value, *ids_only)?;
                    relations.push((rel.property.clone(), related));
                }
            }
        }

        if is_new {
            if let Some(id) = id {
                for &index in &self.inverse {
                    let rel = info.relationship_at(index);
                    let list = self.inverse_list(provider, &plain_ctx, rel, id)?;
                    relations.push((rel.property.clone(), list));
                }
            }
        }

        {
            let mut entity = handle.write();
            entity.values.extend(values);
            entity.relations.extend(relations);
            for (raw, name) in &self.meta {
                if let Some(value) = record.get(raw) {
                    entity.meta.insert(name.clone(), value.clone());
                }
            }
        }

        if let Some(rel) = info.parent_relationship() {
            match parent {
                Some(ParentValue::Link(parent)) => {
                    link_parent(provider, handle, &parent, &rel.property)?;
                }
                Some(ParentValue::Pending(related)) => {
                    handle
                        .write()
                        .relations
                        .insert(rel.property.clone(), related);
                }
                None => {
                    if let Some(parent) = ctx.parent().filter(|p| p.type_name() == info.name()) {
                        link_parent(provider, handle, &parent, &rel.property)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn extract_id(&self, record: &Map<String, Value>) -> Result<Option<EntityId>> {
        let Some(value) = self.id_key.as_ref().and_then(|k| record.get(k)) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        EntityId::from_value(value)
            .map(Some)
            .ok_or_else(|| Error::InvalidFieldValue {
                entity: self.info.name().to_string(),
                field: self.info.id_field().to_string(),
                expected: "an integer or string identifier".into(),
            })
    }

    fn values(
        &self,
        ctx: &Context,
        record: &Map<String, Value>,
        is_new: bool,
    ) -> Result<BTreeMap<String, Value>> {
        let entity = self.info.name();
        let mut values = BTreeMap::new();
        for (raw, field) in &self.fields {
            // Absent under complete conformity when a record strays from the batch layout.
            let Some(value) = record.get(raw) else {
                continue;
            };
            if !is_new && field.read_only {
                if ctx.strict() {
                    return Err(Error::ReadOnlyField {
                        entity: entity.to_string(),
                        field: field.name.clone(),
                    });
                }
                continue;
            }
            if value.is_null() {
                if field.required {
                    return Err(Error::InvalidFieldValue {
                        entity: entity.to_string(),
                        field: field.name.clone(),
                        expected: format!("a non-null {}", field.kind),
                    });
                }
            } else if !field.kind.accepts(value) {
                return Err(Error::InvalidFieldValue {
                    entity: entity.to_string(),
                    field: field.name.clone(),
                    expected: field.kind.to_string(),
                });
            }
            values.insert(field.name.clone(), value.clone());
        }
        if is_new {
            for (name, value) in &self.defaults {
                values.insert(name.clone(), value.clone());
            }
        }
        Ok(values)
    }

    fn relate(
        &self,
        provider: &Arc<SyncProvider>,
        ctx: &Context,
        rel: &Relationship,
        value: &Value,
        ids_only: bool,
    ) -> Result<Related> {
        let invalid = |expected: &str| Error::InvalidFieldValue {
            entity: self.info.name().to_string(),
            field: rel.property.clone(),
            expected: expected.to_string(),
        };
        let hydration = ctx.hydration_for(&rel.target, rel.hydration);

        match value {
            Value::Null => Ok(Related::None),
            Value::Array(items) => {
                if !rel.is_list() {
                    return Err(invalid("a single identifier or object"));
                }
                if items.is_empty() {
                    return Ok(Related::Many(Vec::new()));
                }
                let target = provider.provider_for(&rel.target, ctx)?;
                if items.iter().all(is_scalar) {
                    let ids = items
                        .iter()
                        .map(EntityId::from_value)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid("a list of identifiers"))?;
                    let source = ListSource::Ids(ids);
                    let list = DeferredList::new(&target, &rel.target, source, hydration, ctx);
                    Ok(Related::DeferredList(list))
                } else if !ids_only && items.iter().all(Value::is_object) {
                    let handles = items
                        .iter()
                        .map(|item| target.provide(&rel.target, ctx, item.clone()))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Related::Many(handles))
                } else {
                    Err(invalid("identifiers or objects, not a mix"))
                }
            }
            Value::Object(_) if !ids_only => {
                let target = provider.provider_for(&rel.target, ctx)?;
                let handle = target.provide(&rel.target, ctx, value.clone())?;
                if rel.is_list() {
                    Ok(Related::Many(vec![handle]))
                } else {
                    Ok(Related::One(handle))
                }
            }
            scalar if is_scalar(scalar) && !rel.is_list() => {
                let id = EntityId::from_value(scalar).ok_or_else(|| invalid("an identifier"))?;
                let target = provider.provider_for(&rel.target, ctx)?;
                let deferred = DeferredEntity::new(&target, &rel.target, id, hydration, ctx);
                Ok(Related::Deferred(deferred))
            }
            _ if rel.is_list() => Err(invalid("a list of identifiers or objects")),
            _ => Err(invalid("an identifier or object")),
        }
    }

    fn relate_parent(
        &self,
        provider: &Arc<SyncProvider>,
        ctx: &Context,
        rel: &Relationship,
        value: &Value,
        handle: &EntityHandle,
        own_key: Option<&EntityKey>,
    ) -> Result<ParentValue> {
        match value {
            Value::Null => Ok(ParentValue::Pending(Related::None)),
            Value::Object(_) => {
                let target = provider.provider_for(&rel.target, ctx)?;
                Ok(ParentValue::Link(target.provide(&rel.target, ctx, value.clone())?))
            }
            scalar => {
                let id = EntityId::from_value(scalar).ok_or_else(|| Error::InvalidFieldValue {
                    entity: self.info.name().to_string(),
                    field: rel.property.clone(),
                    expected: "an identifier or object".into(),
                })?;
                let target = provider.provider_for(&rel.target, ctx)?;
                let key = EntityKey::new(target.id(), rel.target.as_str(), id.clone());
                if own_key == Some(&key) {
                    return Ok(ParentValue::Link(handle.clone()));
                }
                match target.store().get_entity(&key) {
                    Some(parent) => Ok(ParentValue::Link(parent)),
                    None => {
                        let hydration = ctx.hydration_for(&rel.target, rel.hydration);
                        let deferred =
                            DeferredEntity::new(&target, &rel.target, id, hydration, ctx);
                        Ok(ParentValue::Pending(Related::Deferred(deferred)))
                    }
                }
            }
        }
    }

    fn inverse_list(
        &self,
        provider: &Arc<SyncProvider>,
        ctx: &Context,
        rel: &Relationship,
        id: &EntityId,
    ) -> Result<Related> {
        let target = provider.provider_for(&rel.target, ctx)?;
        let mut filter = BTreeMap::new();
        if let Some(inverse) = &rel.inverse {
            filter.insert(inverse.clone(), id.to_value());
        }
        let hydration = ctx.hydration_for(&rel.target, rel.hydration);
        Ok(Related::DeferredList(DeferredList::new(
            &target,
            &rel.target,
            ListSource::Filter(filter),
            hydration,
            ctx,
        )))
    }
}

fn is_scalar(value: &Value) -> bool {
    value.is_number() || value.is_string()
}

fn linked_parent(node: &EntityHandle, property: &str) -> Option<EntityHandle> {
    match node.read().relations.get(property) {
        Some(Related::One(parent)) => Some(parent.clone()),
        Some(Related::Deferred(deferred)) => deferred.peek(),
        _ => None,
    }
}

/// Points `child` at `parent` and adds it to the parent's children.
///
/// Rejects (and records) links that would make `child` its own ancestor.
fn link_parent(
    provider: &SyncProvider,
    child: &EntityHandle,
    parent: &EntityHandle,
    property: &str,
) -> Result<()> {
    let mut cursor = Some(parent.clone());
    while let Some(node) = cursor {
        if node.ptr_eq(child) {
            return Err(provider.report(
                SyncError::new(
                    SyncErrorType::HierarchyIsCircular,
                    format!("{} would become its own ancestor", child.label()),
                )
                .with_entity(child.type_name(), child.id()),
            ));
        }
        cursor = linked_parent(&node, property);
    }

    let previous = child
        .write()
        .relations
        .insert(property.to_string(), Related::One(parent.clone()));
    if let Some(Related::One(old)) = previous {
        if !old.ptr_eq(parent) {
            old.write()
                .children
                .retain(|w| w.upgrade().is_some_and(|h| !h.ptr_eq(child)));
        }
    }

    let mut parent = parent.write();
    let linked = parent
        .children
        .iter()
        .any(|w| w.upgrade().is_some_and(|h| h.ptr_eq(child)));
    if !linked {
        parent.children.push(child.downgrade());
    }
    Ok(())
}

// Recoverable failures leave the placeholder unresolved for a later read.
fn hydrate_eager(handle: &EntityHandle) -> Result<()> {
    let pending: Vec<Related> = handle.read().relations.values().cloned().collect();
    for related in pending {
        let result = match &related {
            Related::Deferred(deferred) => deferred.hydrate_eager(),
            Related::DeferredList(list) => list.hydrate_eager(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            if !err.is_recoverable() {
                return Err(err);
            }
            warn!(entity = %handle.label(), error = %err, "eager hydration failed");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "construct_tests.rs"]
mod tests;
