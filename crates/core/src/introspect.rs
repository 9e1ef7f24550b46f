// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Cached descriptors for entity types and providers.
//!
//! The [`Introspector`] is the registry every other component consults: it
//! owns the declared [`EntityType`]s, the validated [`EntityInfo`] built from
//! each, the per-provider [`ProviderInfo`] dispatch tables and the
//! signature-keyed construction closures. Each is built once and reused for
//! the lifetime of the registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::construct::CreateClosure;
use crate::entity::{EntityType, FieldDef, RelationKind, RelationRole, Relationship};
use crate::error::{Error, Result};
use crate::naming::{method_key, plural, snake_case};
use crate::operation::SyncOperation;
use crate::provider::Provider;

/// How a record key maps onto an entity type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Claim<'a> {
    Id,
    Field(&'a FieldDef),
    Relationship { index: usize, ids_only: bool },
    Meta,
    Unclaimed,
}

/// Validated descriptor for one entity type.
#[derive(Debug)]
pub struct EntityInfo {
    decl: EntityType,
    fields: HashMap<String, usize>,
    relationships: HashMap<String, usize>,
}

impl EntityInfo {
    fn new(decl: EntityType) -> Self {
        let fields = decl
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let relationships = decl
            .relationships
            .iter()
            .enumerate()
            .map(|(i, r)| (r.property.clone(), i))
            .collect();
        EntityInfo {
            decl,
            fields,
            relationships,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn noun(&self) -> &str {
        &self.decl.noun
    }

    pub fn plural(&self) -> &str {
        &self.decl.plural
    }

    pub fn id_field(&self) -> &str {
        &self.decl.id_field
    }

    pub fn is_extensible(&self) -> bool {
        self.decl.extensible
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.decl.fields
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.decl.relationships
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name).map(|&i| &self.decl.fields[i])
    }

    pub fn relationship(&self, property: &str) -> Option<&Relationship> {
        self.relationships
            .get(property)
            .map(|&i| &self.decl.relationships[i])
    }

    pub(crate) fn relationship_at(&self, index: usize) -> &Relationship {
        &self.decl.relationships[index]
    }

    pub fn parent_relationship(&self) -> Option<&Relationship> {
        self.decl
            .relationships
            .iter()
            .find(|r| r.role == RelationRole::Parent)
    }

    pub fn children_relationship(&self) -> Option<&Relationship> {
        self.decl
            .relationships
            .iter()
            .find(|r| r.role == RelationRole::Children)
    }

    /// Classifies a raw record key.
    ///
    /// Keys ending in `_id` or `_ids` claim the matching one-to-one or
    /// one-to-many relationship and carry identifiers only.
    pub(crate) fn claim(&self, raw_key: &str) -> Claim<'_> {
        let key = snake_case(raw_key);
        if key == self.decl.id_field {
            return Claim::Id;
        }
        if let Some(field) = self.field(&key) {
            return Claim::Field(field);
        }
        if let Some(&index) = self.relationships.get(&key) {
            return Claim::Relationship {
                index,
                ids_only: false,
            };
        }
        if let Some(index) = self.suffixed_relationship(&key) {
            return Claim::Relationship {
                index,
                ids_only: true,
            };
        }
        if self.decl.extensible {
            Claim::Meta
        } else {
            Claim::Unclaimed
        }
    }

    /// Relationship named by a `<stem>_id` or `<stem>_ids` key.
    ///
    /// `task_ids` matches a one-to-many `tasks` (or `task`); `manager_id`
    /// matches a one-to-one `manager`.
    fn suffixed_relationship(&self, key: &str) -> Option<usize> {
        let kind_matches =
            |index: &usize, kind: RelationKind| self.decl.relationships[*index].kind == kind;
        if let Some(stem) = key.strip_suffix("_ids") {
            return [plural(stem), stem.to_string()]
                .iter()
                .filter_map(|name| self.relationships.get(name.as_str()))
                .copied()
                .find(|index| kind_matches(index, RelationKind::OneToMany));
        }
        let stem = key.strip_suffix("_id")?;
        self.relationships
            .get(stem)
            .copied()
            .filter(|index| kind_matches(index, RelationKind::OneToOne))
    }
}

/// Dispatch metadata for one provider.
#[derive(Debug)]
pub struct ProviderInfo {
    name: String,
    services: BTreeSet<String>,
    declared: HashMap<String, String>,
    operation_methods: HashMap<(String, SyncOperation), String>,
    dispatch: HashMap<String, Option<(String, SyncOperation)>>,
}

impl ProviderInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self, entity_type: &str) -> bool {
        self.services.contains(entity_type)
    }

    pub fn serviced_types(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(String::as_str)
    }

    /// The declared method implementing `operation` for `entity_type`, if any.
    pub fn operation_method(&self, entity_type: &str, operation: SyncOperation) -> Option<&str> {
        self.operation_methods
            .get(&(entity_type.to_string(), operation))
            .map(String::as_str)
    }

    pub fn is_declared(&self, method: &str) -> bool {
        self.declared.contains_key(&method_key(method))
    }

    /// Maps an undeclared, conventionally named method to its operation.
    ///
    /// Returns `None` for unknown names and for names implied by more than
    /// one (entity, operation) pair.
    pub fn dispatch(&self, method: &str) -> Option<(&str, SyncOperation)> {
        self.dispatch
            .get(&method_key(method))
            .and_then(|target| target.as_ref())
            .map(|(entity, op)| (entity.as_str(), *op))
    }
}

/// Conventional method names (as method keys) for an operation on an entity.
pub fn conventional_methods(info: &EntityInfo, operation: SyncOperation) -> Vec<String> {
    let verb = match operation {
        SyncOperation::Create | SyncOperation::CreateList => "create",
        SyncOperation::Read | SyncOperation::ReadList => "get",
        SyncOperation::Update | SyncOperation::UpdateList => "update",
        SyncOperation::Delete | SyncOperation::DeleteList => "delete",
    };
    let names = if operation.is_list() {
        vec![
            format!("{verb}{}", info.plural()),
            format!("{verb}list{}", info.noun()),
        ]
    } else {
        vec![format!("{verb}{}", info.noun())]
    };
    names.iter().map(|n| method_key(n)).collect()
}

type ClosureKey = (String, bool, String);

/// Registry of entity and provider descriptors.
#[derive(Default)]
pub struct Introspector {
    declared: RwLock<HashMap<String, EntityType>>,
    entities: RwLock<HashMap<String, Arc<EntityInfo>>>,
    providers: RwLock<HashMap<String, Arc<ProviderInfo>>>,
    closures: RwLock<HashMap<ClosureKey, Arc<CreateClosure>>>,
    closure_builds: AtomicUsize,
}

impl Introspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an entity type. Declarations are validated on first introspection.
    pub fn register(&self, decl: EntityType) -> Result<()> {
        let mut declared = self.declared.write();
        if declared.contains_key(&decl.name) {
            return Err(Error::DuplicateEntityType(decl.name));
        }
        declared.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.declared.read().contains_key(entity_type)
    }

    /// Returns the cached descriptor for `entity_type`, building it on first use.
    pub fn introspect(&self, entity_type: &str) -> Result<Arc<EntityInfo>> {
        if let Some(info) = self.entities.read().get(entity_type) {
            return Ok(Arc::clone(info));
        }

        let decl = self
            .declared
            .read()
            .get(entity_type)
            .cloned()
            .ok_or_else(|| Error::UnknownEntityType(entity_type.to_string()))?;
        self.validate(&decl)?;

        let mut entities = self.entities.write();
        let info = entities
            .entry(entity_type.to_string())
            .or_insert_with(|| {
                debug!(entity = entity_type, "introspected entity type");
                Arc::new(EntityInfo::new(decl))
            });
        Ok(Arc::clone(info))
    }

    fn validate(&self, decl: &EntityType) -> Result<()> {
        let declared = self.declared.read();
        let invalid = |rel: &Relationship, reason: String| Error::InvalidRelationship {
            entity: decl.name.clone(),
            property: rel.property.clone(),
            reason,
        };

        let mut seen = BTreeSet::new();
        for field in &decl.fields {
            if !seen.insert(field.name.as_str()) || field.name == decl.id_field {
                return Err(Error::DuplicateProperty {
                    entity: decl.name.clone(),
                    property: field.name.clone(),
                });
            }
        }

        let mut parents = 0;
        let mut children = 0;
        for rel in &decl.relationships {
            if !seen.insert(rel.property.as_str()) || rel.property == decl.id_field {
                return Err(Error::DuplicateProperty {
                    entity: decl.name.clone(),
                    property: rel.property.clone(),
                });
            }
            if !declared.contains_key(&rel.target) {
                return Err(invalid(
                    rel,
                    format!("target {} is not registered", rel.target),
                ));
            }
            match rel.role {
                RelationRole::Parent => parents += 1,
                RelationRole::Children => children += 1,
                RelationRole::Plain => {}
            }
            if rel.role != RelationRole::Plain && rel.target != decl.name {
                return Err(invalid(rel, "hierarchies must target their own type".into()));
            }
            if rel.inverse.is_some() && !rel.is_list() {
                return Err(invalid(
                    rel,
                    "only one-to-many relationships take an inverse key".into(),
                ));
            }
        }
        if parents > 1 || children > 1 {
            return Err(Error::InvalidRelationship {
                entity: decl.name.clone(),
                property: String::new(),
                reason: "at most one parent and one children property".into(),
            });
        }
        Ok(())
    }

    /// Builds (once per provider name) the operation and dispatch tables.
    ///
    /// More than one declared method for the same (entity, operation) is a
    /// configuration error.
    pub fn introspect_provider(&self, provider: &dyn Provider) -> Result<Arc<ProviderInfo>> {
        if let Some(info) = self.providers.read().get(provider.name()) {
            return Ok(Arc::clone(info));
        }

        let mut services = BTreeSet::new();
        let mut infos = Vec::new();
        for entity_type in provider.entity_types() {
            infos.push(self.introspect(&entity_type)?);
            services.insert(entity_type);
        }

        let decls = provider.methods();
        let declared: HashMap<String, String> = decls
            .iter()
            .map(|d| (method_key(&d.name), d.name.clone()))
            .collect();

        let mut operation_methods = HashMap::new();
        let mut dispatch: HashMap<String, Option<(String, SyncOperation)>> = HashMap::new();
        for info in &infos {
            for op in SyncOperation::ALL {
                let names = conventional_methods(info, op);
                let candidates: Vec<String> = decls
                    .iter()
                    .filter(|d| match &d.binding {
                        Some((entity, bound)) => entity == info.name() && *bound == op,
                        None => names.contains(&method_key(&d.name)),
                    })
                    .map(|d| d.name.clone())
                    .collect();
                if candidates.len() > 1 {
                    return Err(Error::AmbiguousOperationMethod {
                        entity: info.name().to_string(),
                        operation: op,
                        methods: candidates,
                    });
                }
                if let Some(method) = candidates.into_iter().next() {
                    operation_methods.insert((info.name().to_string(), op), method);
                }

                for name in names {
                    if declared.contains_key(&name) {
                        continue;
                    }
                    let target = (info.name().to_string(), op);
                    dispatch
                        .entry(name)
                        .and_modify(|existing| {
                            if existing.as_ref() != Some(&target) {
                                *existing = None;
                            }
                        })
                        .or_insert(Some(target));
                }
            }
        }

        let info = Arc::new(ProviderInfo {
            name: provider.name().to_string(),
            services,
            declared,
            operation_methods,
            dispatch,
        });
        debug!(
            provider = provider.name(),
            methods = info.operation_methods.len(),
            "introspected provider"
        );
        self.providers
            .write()
            .insert(provider.name().to_string(), Arc::clone(&info));
        Ok(info)
    }

    /// Number of construction closures built so far.
    pub fn closure_builds(&self) -> usize {
        self.closure_builds.load(Ordering::Relaxed)
    }

    /// Returns the closure for a record signature, building it on first use.
    ///
    /// `keys` are the raw record keys; `sorted` selects whether the signature
    /// is order-independent.
    pub(crate) fn create_closure(
        &self,
        info: &Arc<EntityInfo>,
        keys: &[&str],
        strict: bool,
        sorted: bool,
    ) -> Result<Arc<CreateClosure>> {
        let signature = signature(keys, sorted);
        let cache_key = (info.name().to_string(), strict, signature);
        if let Some(closure) = self.closures.read().get(&cache_key) {
            return Ok(Arc::clone(closure));
        }

        let closure = Arc::new(CreateClosure::build(info, keys, strict)?);
        let mut closures = self.closures.write();
        let closure = closures.entry(cache_key).or_insert_with(|| {
            self.closure_builds.fetch_add(1, Ordering::Relaxed);
            debug!(entity = info.name(), keys = keys.len(), strict, "built create closure");
            closure
        });
        Ok(Arc::clone(closure))
    }
}

fn signature(keys: &[&str], sorted: bool) -> String {
    if sorted {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.join("\u{1f}")
    } else {
        keys.join("\u{1f}")
    }
}

#[cfg(test)]
#[path = "introspect_tests.rs"]
mod tests;
