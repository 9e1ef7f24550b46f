// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity descriptors and the shared entity handles built from them.
//!
//! Entity types are declared up front with [`EntityType`] and registered with
//! the [`Introspector`](crate::Introspector). Instances are shared through
//! [`EntityHandle`] so that two records with the same identity resolve to the
//! same object for the lifetime of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deferred::{DeferredEntity, DeferredList};
use crate::error::{Error, Result};
use crate::introspect::EntityInfo;
use crate::naming::{plural, short_name, snake_case};
use crate::serialize::{serialize, SerializeRules};

/// Identity of an entity as reported by its backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Reads an identifier from a JSON number or string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) if !s.is_empty() => Some(EntityId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(n) => Value::from(*n),
            EntityId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{n}"),
            EntityId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Str(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Str(s)
    }
}

/// The (provider, type, identifier) triple that makes an entity unique in a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub provider_id: i64,
    pub entity_type: String,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(provider_id: i64, entity_type: impl Into<String>, id: EntityId) -> Self {
        EntityKey {
            provider_id,
            entity_type: entity_type.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.entity_type, self.id, self.provider_id)
    }
}

/// Value type of a plain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    String,
    /// RFC 3339 string or Unix seconds.
    Timestamp,
    Json,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Json => "json",
        }
    }

    /// Whether a non-null JSON value can be stored in a field of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::String => value.is_string(),
            FieldKind::Timestamp => match value {
                Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
                Value::Number(n) => n.is_i64(),
                _ => false,
            },
            FieldKind::Json => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plain (non-relationship) field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    /// Constructor parameters must be present when an entity is first created.
    pub constructor: bool,
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        FieldDef {
            name: snake_case(name),
            kind,
            required: false,
            read_only: false,
            constructor: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.constructor = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// When a deferred relationship is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hydration {
    /// Never resolved implicitly.
    Suppress,
    /// Resolved on first read.
    #[default]
    Lazy,
    /// Resolved before the owning entity is returned.
    Eager,
}

impl Hydration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hydration::Suppress => "suppress",
            Hydration::Lazy => "lazy",
            Hydration::Eager => "eager",
        }
    }
}

impl fmt::Display for Hydration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Hydration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "suppress" => Ok(Hydration::Suppress),
            "lazy" => Ok(Hydration::Lazy),
            "eager" => Ok(Hydration::Eager),
            _ => Err(Error::CorruptedData(format!("unknown hydration policy: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
}

/// Whether a relationship is an ordinary link or one end of a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRole {
    Plain,
    Parent,
    Children,
}

/// A declared link from one entity type to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub property: String,
    pub kind: RelationKind,
    pub target: String,
    pub hydration: Hydration,
    /// Filter key on the target that points back at the owner.
    ///
    /// One-to-many relationships with an inverse key are filled with a
    /// filter placeholder when a record carries no data for them.
    pub inverse: Option<String>,
    pub role: RelationRole,
}

impl Relationship {
    pub fn one_to_one(property: &str, target: &str) -> Self {
        Relationship {
            property: snake_case(property),
            kind: RelationKind::OneToOne,
            target: target.to_string(),
            hydration: Hydration::default(),
            inverse: None,
            role: RelationRole::Plain,
        }
    }

    pub fn one_to_many(property: &str, target: &str) -> Self {
        Relationship {
            kind: RelationKind::OneToMany,
            ..Relationship::one_to_one(property, target)
        }
    }

    pub fn with_hydration(mut self, hydration: Hydration) -> Self {
        self.hydration = hydration;
        self
    }

    pub fn with_inverse(mut self, key: &str) -> Self {
        self.inverse = Some(snake_case(key));
        self
    }

    pub fn is_list(&self) -> bool {
        self.kind == RelationKind::OneToMany
    }
}

/// Declaration of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    pub name: String,
    pub noun: String,
    pub plural: String,
    pub id_field: String,
    pub fields: Vec<FieldDef>,
    pub relationships: Vec<Relationship>,
    /// Keep keys no field or relationship claims as meta values.
    pub extensible: bool,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        let noun = snake_case(short_name(name));
        EntityType {
            name: name.to_string(),
            plural: plural(&noun),
            noun,
            id_field: "id".to_string(),
            fields: Vec::new(),
            relationships: Vec::new(),
            extensible: false,
        }
    }

    /// Sets the noun and resets the plural to match it.
    pub fn with_noun(mut self, noun: &str) -> Self {
        self.noun = snake_case(noun);
        self.plural = plural(&self.noun);
        self
    }

    pub fn with_plural(mut self, plural: &str) -> Self {
        self.plural = snake_case(plural);
        self
    }

    pub fn with_id_field(mut self, field: &str) -> Self {
        self.id_field = snake_case(field);
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Declares `property` as the parent pointer of a self-referencing hierarchy.
    pub fn with_parent(mut self, property: &str) -> Self {
        let mut rel = Relationship::one_to_one(property, &self.name);
        rel.role = RelationRole::Parent;
        self.relationships.push(rel);
        self
    }

    /// Declares `property` as the children of a self-referencing hierarchy.
    pub fn with_children(mut self, property: &str) -> Self {
        let mut rel = Relationship::one_to_many(property, &self.name);
        rel.role = RelationRole::Children;
        self.relationships.push(rel);
        self
    }

    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }
}

/// The value held by a relationship property.
#[derive(Clone, Default)]
pub enum Related {
    #[default]
    None,
    One(EntityHandle),
    Many(Vec<EntityHandle>),
    Deferred(DeferredEntity),
    DeferredList(DeferredList),
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::None => write!(f, "None"),
            Related::One(handle) => write!(f, "One({})", handle.label()),
            Related::Many(list) => write!(f, "Many(len={})", list.len()),
            Related::Deferred(deferred) => write!(f, "Deferred({})", deferred.key()),
            Related::DeferredList(list) => write!(f, "DeferredList({:?})", list.state()),
        }
    }
}

/// A typed record.
///
/// Entities are only reachable through an [`EntityHandle`]; fields are
/// assigned by the construction closures during synchronization.
pub struct Entity {
    pub(crate) info: Arc<EntityInfo>,
    pub(crate) id: Option<EntityId>,
    pub(crate) provider_id: Option<i64>,
    pub(crate) values: BTreeMap<String, Value>,
    pub(crate) relations: BTreeMap<String, Related>,
    pub(crate) meta: BTreeMap<String, Value>,
    pub(crate) children: Vec<WeakHandle>,
}

impl Entity {
    pub(crate) fn new(info: Arc<EntityInfo>) -> Self {
        Entity {
            info,
            id: None,
            provider_id: None,
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            meta: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn info(&self) -> &Arc<EntityInfo> {
        &self.info
    }

    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    pub fn provider_id(&self) -> Option<i64> {
        self.provider_id
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    pub fn relation(&self, property: &str) -> Option<&Related> {
        self.relations.get(property)
    }

    /// The key this entity is registered under, once it has an identity.
    pub fn key(&self) -> Option<EntityKey> {
        match (&self.id, self.provider_id) {
            (Some(id), Some(provider_id)) => {
                Some(EntityKey::new(provider_id, self.info.name(), id.clone()))
            }
            _ => None,
        }
    }
}

/// Shared, lockable reference to an entity.
#[derive(Clone)]
pub struct EntityHandle(Arc<RwLock<Entity>>);

/// Non-owning reference used for child links.
#[derive(Clone)]
pub struct WeakHandle(Weak<RwLock<Entity>>);

impl WeakHandle {
    pub fn upgrade(&self) -> Option<EntityHandle> {
        self.0.upgrade().map(EntityHandle)
    }

    pub fn ptr_eq(&self, other: &WeakHandle) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl EntityHandle {
    pub(crate) fn new(entity: Entity) -> Self {
        EntityHandle(Arc::new(RwLock::new(entity)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Entity> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Entity> {
        self.0.write()
    }

    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle(Arc::downgrade(&self.0))
    }

    /// True when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }

    pub fn id(&self) -> Option<EntityId> {
        self.read().id.clone()
    }

    pub fn type_name(&self) -> String {
        self.read().info.name().to_string()
    }

    pub fn key(&self) -> Option<EntityKey> {
        self.read().key()
    }

    /// Value of a plain field or meta key.
    pub fn get(&self, field: &str) -> Option<Value> {
        let field = snake_case(field);
        let entity = self.read();
        if field == entity.info.id_field() {
            return entity.id.as_ref().map(EntityId::to_value);
        }
        entity
            .values
            .get(&field)
            .or_else(|| entity.meta.get(&field))
            .cloned()
    }

    /// Follows a one-to-one relationship, resolving it if the hydration policy allows.
    pub fn related(&self, property: &str) -> Result<Option<EntityHandle>> {
        match self.relation_value(property, false)?.0 {
            Related::None => Ok(None),
            Related::One(handle) => Ok(Some(handle)),
            Related::Deferred(deferred) => deferred.get(),
            Related::Many(_) | Related::DeferredList(_) => Err(self.kind_mismatch(property)),
        }
    }

    /// Follows a one-to-many relationship, resolving it if the hydration policy allows.
    pub fn related_list(&self, property: &str) -> Result<Vec<EntityHandle>> {
        match self.relation_value(property, true)? {
            (Related::None, RelationRole::Children) => Ok(self.children()),
            (Related::None, _) => Ok(Vec::new()),
            (Related::Many(list), _) => Ok(list),
            (Related::DeferredList(deferred), _) => deferred.get(),
            (Related::One(_) | Related::Deferred(_), _) => Err(self.kind_mismatch(property)),
        }
    }

    /// The parent in a hierarchy, if the type declares one.
    pub fn parent(&self) -> Result<Option<EntityHandle>> {
        let property = self
            .read()
            .info
            .parent_relationship()
            .map(|rel| rel.property.clone());
        match property {
            Some(property) => self.related(&property),
            None => Ok(None),
        }
    }

    /// Children linked to this entity during the run.
    pub fn children(&self) -> Vec<EntityHandle> {
        self.read()
            .children
            .iter()
            .filter_map(WeakHandle::upgrade)
            .collect()
    }

    /// Serializes with default rules: relationships as identifiers.
    pub fn to_value(&self) -> Value {
        serialize(self, &SerializeRules::default())
    }

    pub(crate) fn label(&self) -> String {
        let entity = self.read();
        match &entity.id {
            Some(id) => format!("{}#{id}", entity.info.name()),
            None => format!("{}#<new>", entity.info.name()),
        }
    }

    // Clones the value out so no lock is held while a placeholder resolves.
    fn relation_value(&self, property: &str, list: bool) -> Result<(Related, RelationRole)> {
        let property = snake_case(property);
        let entity = self.read();
        let rel = entity
            .info
            .relationship(&property)
            .ok_or_else(|| Error::UnknownProperty {
                entity: entity.info.name().to_string(),
                property: property.clone(),
            })?;
        if rel.is_list() != list {
            return Err(Error::InvalidRelationship {
                entity: entity.info.name().to_string(),
                property,
                reason: if list {
                    "is one-to-one".into()
                } else {
                    "is one-to-many".into()
                },
            });
        }
        let role = rel.role;
        Ok((
            entity.relations.get(&property).cloned().unwrap_or_default(),
            role,
        ))
    }

    fn kind_mismatch(&self, property: &str) -> Error {
        Error::InvalidRelationship {
            entity: self.type_name(),
            property: snake_case(property),
            reason: "holds a value of the wrong cardinality".into(),
        }
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityHandle({})", self.label())
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
