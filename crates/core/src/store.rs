// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed, run-scoped bookkeeping.
//!
//! The [`Store`] registers providers, entity types and namespaces, keeps
//! the entities synchronized during a run (for de-duplication), aggregates
//! sync errors, and owns the run lifecycle. A run is opened by the first
//! bookkeeping call, never by opening the store, and is finalized exactly
//! once: by [`Store::close`], or with exit status 1 when the store is
//! dropped while a run is still open.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deferred::Slot;
use crate::entity::{EntityHandle, EntityId, EntityKey};
use crate::error::{Error, Result};
use crate::sync_error::{ErrorLevel, SyncError, SyncErrorRecord};

/// SQL schema for the bookkeeping database.
pub const SCHEMA: &str = r#"
-- One row per synchronizer execution
CREATE TABLE IF NOT EXISTS _sync_run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_uuid TEXT NOT NULL UNIQUE,
    command TEXT NOT NULL,
    arguments_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    exit_status INTEGER,
    error_count INTEGER NOT NULL DEFAULT 0,
    warning_count INTEGER NOT NULL DEFAULT 0,
    errors_json TEXT
);

-- Providers keyed by a hash of (class, backend identifier)
CREATE TABLE IF NOT EXISTS _sync_provider (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL UNIQUE,
    class TEXT NOT NULL,
    identifier_json TEXT NOT NULL,
    added_at TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS _sync_entity_type (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity TEXT NOT NULL UNIQUE,
    added_at TEXT NOT NULL
);

-- Last activity and last full sync per provider and entity type
CREATE TABLE IF NOT EXISTS _sync_entity_type_state (
    provider_id INTEGER NOT NULL,
    entity_type_id INTEGER NOT NULL,
    last_seen TEXT NOT NULL,
    last_sync TEXT,
    PRIMARY KEY (provider_id, entity_type_id),
    FOREIGN KEY (provider_id) REFERENCES _sync_provider(id),
    FOREIGN KEY (entity_type_id) REFERENCES _sync_entity_type(id)
);

-- Synchronized entities; entity_id holds the JSON-encoded identifier
CREATE TABLE IF NOT EXISTS _sync_entity (
    provider_id INTEGER NOT NULL,
    entity_type_id INTEGER NOT NULL,
    entity_id TEXT NOT NULL,
    canonical_id TEXT,
    is_dirty INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    entity_json TEXT,
    last_run_id INTEGER,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (provider_id, entity_type_id, entity_id),
    FOREIGN KEY (provider_id) REFERENCES _sync_provider(id),
    FOREIGN KEY (entity_type_id) REFERENCES _sync_entity_type(id),
    FOREIGN KEY (last_run_id) REFERENCES _sync_run(id)
);

CREATE TABLE IF NOT EXISTS _sync_entity_namespace (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prefix TEXT NOT NULL UNIQUE,
    base_uri TEXT NOT NULL,
    type_namespace TEXT NOT NULL UNIQUE,
    added_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_entity_canonical ON _sync_entity(entity_type_id, canonical_id);
CREATE INDEX IF NOT EXISTS idx_sync_run_started ON _sync_run(started_at);
"#;

/// Apply the schema to a connection. Idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

fn corrupted(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(Error::CorruptedData(message)),
    )
}

/// Parse a JSON column, returning a rusqlite error on failure.
fn parse_json<T: serde::de::DeserializeOwned>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(value)
        .map_err(|_| corrupted(format!("invalid JSON in column '{column}'")))
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupted(format!("invalid timestamp '{value}' in column '{column}'")))
}

fn parse_timestamp_opt(
    value: Option<String>,
    column: &str,
) -> std::result::Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value.map(|v| parse_timestamp(&v, column)).transpose()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file; `None` keeps everything in memory.
    pub path: Option<PathBuf>,
    /// Recorded on the run row.
    pub command: String,
    pub arguments: Vec<String>,
    /// Persist each synchronized entity's JSON alongside its flags.
    pub persist_entities: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut args = std::env::args();
        StoreConfig {
            path: None,
            command: args.next().unwrap_or_else(|| "tether".to_string()),
            arguments: args.collect(),
            persist_entities: true,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: &str, arguments: &[&str]) -> Self {
        self.command = command.to_string();
        self.arguments = arguments.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_persist_entities(mut self, persist: bool) -> Self {
        self.persist_entities = persist;
        self
    }
}

/// A prefix and base URI for the entity types under one type namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub prefix: String,
    pub base_uri: String,
    pub type_namespace: String,
}

/// A run as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: i64,
    pub uuid: String,
    pub command: String,
    pub arguments: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_status: Option<i32>,
    pub error_count: u32,
    pub warning_count: u32,
    pub errors: Vec<SyncErrorRecord>,
}

impl RunRecord {
    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTypeState {
    pub last_seen: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Persisted flags for one synchronized entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub canonical_id: Option<String>,
    pub is_dirty: bool,
    pub is_deleted: bool,
    pub json: Option<Value>,
}

#[derive(Default)]
struct RunState {
    id: Option<i64>,
    uuid: Option<Uuid>,
    errors: Vec<SyncErrorRecord>,
    index: HashMap<String, usize>,
    error_count: u32,
    warning_count: u32,
    closed: bool,
}

/// Run-scoped bookkeeping over an embedded database.
///
/// Lock order: `run` before `conn`; `slots` before `entities`.
pub struct Store {
    conn: Mutex<Connection>,
    config: StoreConfig,
    run: Mutex<RunState>,
    providers: Mutex<HashSet<String>>,
    entity_types: Mutex<HashMap<String, i64>>,
    entities: RwLock<HashMap<EntityKey, EntityHandle>>,
    slots: Mutex<HashMap<EntityKey, Arc<Slot<EntityHandle>>>>,
    namespaces: RwLock<Vec<Namespace>>,
}

impl Store {
    /// Open the store described by `config`, creating and migrating the database if needed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Self::connect(path)?,
            None => {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn
            }
        };
        run_migrations(&conn)?;

        let store = Store {
            conn: Mutex::new(conn),
            config,
            run: Mutex::new(RunState::default()),
            providers: Mutex::new(HashSet::new()),
            entity_types: Mutex::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            namespaces: RwLock::new(Vec::new()),
        };
        store.reload_namespaces()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    fn connect(path: &Path) -> Result<Connection> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for concurrency
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn ensure_run(&self, run: &mut RunState) -> Result<i64> {
        if run.closed {
            return Err(Error::StoreClosed);
        }
        if let Some(id) = run.id {
            return Ok(id);
        }

        let uuid = Uuid::new_v4();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO _sync_run (run_uuid, command, arguments_json, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                uuid.to_string(),
                self.config.command,
                serde_json::to_string(&self.config.arguments)?,
                now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        run.id = Some(id);
        run.uuid = Some(uuid);
        info!(run = %uuid, "opened run");
        Ok(id)
    }

    /// UUID of the open run, if one has been opened.
    pub fn run_uuid(&self) -> Option<Uuid> {
        self.run.lock().uuid
    }

    pub fn is_closed(&self) -> bool {
        self.run.lock().closed
    }

    /// Registers a provider and returns its (id, hash).
    ///
    /// The hash is content-addressed, so the same backend maps to the same
    /// id across runs; registering it twice in one session fails.
    pub fn register_provider(&self, class: &str, identifier: &[Value]) -> Result<(i64, String)> {
        let identifier_json = serde_json::to_string(identifier)?;
        let mut hasher = Sha256::new();
        hasher.update(class.as_bytes());
        hasher.update([0]);
        hasher.update(identifier_json.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let mut providers = self.providers.lock();
        if providers.contains(&hash) {
            return Err(Error::ProviderAlreadyRegistered(format!(
                "{class} {identifier_json}"
            )));
        }

        let mut run = self.run.lock();
        self.ensure_run(&mut run)?;
        let conn = self.conn.lock();
        let timestamp = now();
        conn.execute(
            "INSERT INTO _sync_provider (hash, class, identifier_json, added_at, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(hash) DO UPDATE SET last_seen = excluded.last_seen",
            params![hash, class, identifier_json, timestamp],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM _sync_provider WHERE hash = ?1",
            [&hash],
            |row| row.get(0),
        )?;
        providers.insert(hash.clone());
        Ok((id, hash))
    }

    /// Registers an entity type on first use and returns its id.
    pub fn register_entity_type(&self, entity_type: &str) -> Result<i64> {
        if let Some(&id) = self.entity_types.lock().get(entity_type) {
            return Ok(id);
        }

        let mut run = self.run.lock();
        self.ensure_run(&mut run)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO _sync_entity_type (entity, added_at) VALUES (?1, ?2)
             ON CONFLICT(entity) DO NOTHING",
            params![entity_type, now()],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM _sync_entity_type WHERE entity = ?1",
            [entity_type],
            |row| row.get(0),
        )?;
        self.entity_types
            .lock()
            .insert(entity_type.to_string(), id);
        Ok(id)
    }

    /// Registers (or updates) a namespace and reloads the prefix table.
    ///
    /// Namespaces outlive runs, so this does not open one.
    pub fn register_namespace(
        &self,
        prefix: &str,
        base_uri: &str,
        type_namespace: &str,
    ) -> Result<()> {
        let valid_prefix = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_prefix {
            return Err(Error::InvalidNamespace(format!(
                "prefix '{prefix}' must start with a letter and contain only letters, digits, '_' or '-'"
            )));
        }
        url::Url::parse(base_uri)
            .map_err(|e| Error::InvalidNamespace(format!("base URI '{base_uri}': {e}")))?;
        let type_namespace = type_namespace.trim().trim_end_matches("::");
        if type_namespace.is_empty() {
            return Err(Error::InvalidNamespace("type namespace is empty".into()));
        }

        {
            let conn = self.conn.lock();
            let taken: Option<String> = conn
                .query_row(
                    "SELECT prefix FROM _sync_entity_namespace WHERE type_namespace = ?1",
                    [type_namespace],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(other) = taken.filter(|other| other != prefix) {
                return Err(Error::InvalidNamespace(format!(
                    "{type_namespace} is already registered as '{other}'"
                )));
            }
            conn.execute(
                "INSERT INTO _sync_entity_namespace (prefix, base_uri, type_namespace, added_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(prefix) DO UPDATE SET
                     base_uri = excluded.base_uri,
                     type_namespace = excluded.type_namespace",
                params![prefix, base_uri, type_namespace, now()],
            )?;
        }
        info!(prefix, type_namespace, "registered namespace");
        self.reload_namespaces()
    }

    fn reload_namespaces(&self) -> Result<()> {
        let namespaces = self.list_namespaces()?;
        *self.namespaces.write() = namespaces;
        Ok(())
    }

    /// Registered namespaces, longest type namespace first.
    pub fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT prefix, base_uri, type_namespace FROM _sync_entity_namespace
             ORDER BY LENGTH(type_namespace) DESC, prefix",
        )?;
        let namespaces = stmt
            .query_map([], |row| {
                Ok(Namespace {
                    prefix: row.get(0)?,
                    base_uri: row.get(1)?,
                    type_namespace: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(namespaces)
    }

    /// URI of an entity type under the longest matching namespace.
    ///
    /// The compact form is `prefix:Path/To/Type`; the full form appends the
    /// same path to the namespace's base URI.
    pub fn entity_uri(&self, entity_type: &str, compact: bool) -> Option<String> {
        let namespaces = self.namespaces.read();
        let (namespace, rest) = namespaces.iter().find_map(|ns| {
            entity_type
                .strip_prefix(ns.type_namespace.as_str())
                .and_then(|rest| rest.strip_prefix("::"))
                .map(|rest| (ns, rest))
        })?;
        let path = rest.replace("::", "/");
        if compact {
            Some(format!("{}:{path}", namespace.prefix))
        } else if namespace.base_uri.ends_with('/') || namespace.base_uri.ends_with('#') {
            Some(format!("{}{path}", namespace.base_uri))
        } else {
            Some(format!("{}/{path}", namespace.base_uri))
        }
    }

    /// Records a sync error against the open run.
    ///
    /// With `deduplicate`, an error whose content hash was already recorded
    /// only bumps that entry's count. Returns whether a new entry was added.
    pub fn record_error(&self, error: &SyncError, deduplicate: bool) -> Result<bool> {
        let mut run = self.run.lock();
        let run_id = self.ensure_run(&mut run)?;

        let hash = error.content_hash();
        if deduplicate {
            if let Some(&index) = run.index.get(&hash) {
                run.errors[index].count += 1;
                return Ok(false);
            }
        }

        let next = run.errors.len();
        run.index.insert(hash, next);
        run.errors.push(SyncErrorRecord {
            error: error.clone(),
            count: 1,
        });
        match error.level {
            ErrorLevel::Error => run.error_count += 1,
            ErrorLevel::Warning => run.warning_count += 1,
        }
        warn!(level = %error.level, "{error}");

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE _sync_run SET error_count = ?1, warning_count = ?2, errors_json = ?3
             WHERE id = ?4",
            params![
                run.error_count,
                run.warning_count,
                serde_json::to_string(&run.errors)?,
                run_id
            ],
        )?;
        Ok(true)
    }

    /// Errors recorded in the open run.
    pub fn errors(&self) -> Vec<SyncErrorRecord> {
        self.run.lock().errors.clone()
    }

    pub fn error_count(&self) -> u32 {
        self.run.lock().error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.run.lock().warning_count
    }

    pub fn get_entity(&self, key: &EntityKey) -> Option<EntityHandle> {
        self.entities.read().get(key).cloned()
    }

    /// Registers `handle` under `key` unless an instance already holds it.
    ///
    /// Returns the registered instance and whether it is `handle`. Builders
    /// claim the key before filling the entity so concurrent builds of the
    /// same key converge on one instance.
    pub(crate) fn claim_entity(
        &self,
        key: &EntityKey,
        handle: EntityHandle,
    ) -> (EntityHandle, bool) {
        match self.entities.write().entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                entry.insert(handle.clone());
                (handle, true)
            }
        }
    }

    /// Drops a claim made by [`Store::claim_entity`] whose build failed.
    pub(crate) fn release_entity(&self, key: &EntityKey, handle: &EntityHandle) {
        let mut entities = self.entities.write();
        if entities.get(key).is_some_and(|held| held.ptr_eq(handle)) {
            entities.remove(key);
        }
    }

    /// The shared resolution slot for `key`.
    pub(crate) fn slot(&self, key: &EntityKey) -> Arc<Slot<EntityHandle>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(match self.get_entity(key) {
            Some(handle) => Slot::resolved(handle),
            None => Slot::new(),
        });
        slots.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    /// Registers a synchronized entity for de-duplication and persists it.
    ///
    /// Any placeholder waiting on the entity's key is resolved with it.
    pub fn set_entity(&self, handle: &EntityHandle) -> Result<()> {
        let Some(key) = handle.key() else {
            return Ok(());
        };
        let json = if self.config.persist_entities {
            Some(serde_json::to_string(&handle.to_value())?)
        } else {
            None
        };

        self.entities.write().insert(key.clone(), handle.clone());
        let slot = self.slots.lock().get(&key).cloned();
        if let Some(slot) = slot {
            slot.fulfil(handle.clone());
        }

        let entity_type_id = self.register_entity_type(&key.entity_type)?;
        let mut run = self.run.lock();
        let run_id = self.ensure_run(&mut run)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO _sync_entity
                 (provider_id, entity_type_id, entity_id, entity_json, last_run_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(provider_id, entity_type_id, entity_id) DO UPDATE SET
                 entity_json = COALESCE(excluded.entity_json, entity_json),
                 is_deleted = 0,
                 last_run_id = excluded.last_run_id,
                 updated_at = excluded.updated_at",
            params![
                key.provider_id,
                entity_type_id,
                serde_json::to_string(&key.id)?,
                json,
                run_id,
                now()
            ],
        )?;
        Ok(())
    }

    fn update_entity_flag(&self, key: &EntityKey, sql: &str, value: Option<&str>) -> Result<()> {
        let entity_type_id = self.register_entity_type(&key.entity_type)?;
        let id_json = serde_json::to_string(&key.id)?;
        let timestamp = now();
        let mut run = self.run.lock();
        self.ensure_run(&mut run)?;
        let conn = self.conn.lock();
        let changed = match value {
            Some(value) => conn.execute(
                sql,
                params![key.provider_id, entity_type_id, id_json, timestamp, value],
            )?,
            None => conn.execute(
                sql,
                params![key.provider_id, entity_type_id, id_json, timestamp],
            )?,
        };
        if changed == 0 {
            return Err(Error::Sync(SyncError::new(
                crate::sync_error::SyncErrorType::EntityNotFound,
                format!("{key} is not registered"),
            )));
        }
        Ok(())
    }

    /// Flags an entity as deleted after a successful delete operation.
    pub fn mark_deleted(&self, key: &EntityKey) -> Result<()> {
        self.update_entity_flag(
            key,
            "UPDATE _sync_entity SET is_deleted = 1, is_dirty = 0, updated_at = ?4
             WHERE provider_id = ?1 AND entity_type_id = ?2 AND entity_id = ?3",
            None,
        )
    }

    /// Flags an entity as changed locally and awaiting an update.
    pub fn mark_dirty(&self, key: &EntityKey) -> Result<()> {
        self.update_entity_flag(
            key,
            "UPDATE _sync_entity SET is_dirty = 1, updated_at = ?4
             WHERE provider_id = ?1 AND entity_type_id = ?2 AND entity_id = ?3",
            None,
        )
    }

    /// Links an entity to an application-wide identifier shared across providers.
    pub fn set_canonical_id(&self, key: &EntityKey, canonical_id: &str) -> Result<()> {
        self.update_entity_flag(
            key,
            "UPDATE _sync_entity SET canonical_id = ?5, updated_at = ?4
             WHERE provider_id = ?1 AND entity_type_id = ?2 AND entity_id = ?3",
            Some(canonical_id),
        )
    }

    pub fn canonical_id(&self, key: &EntityKey) -> Result<Option<String>> {
        Ok(self.entity_record(key)?.and_then(|r| r.canonical_id))
    }

    /// Every registered key of `entity_type` sharing `canonical_id`.
    pub fn keys_by_canonical_id(
        &self,
        entity_type: &str,
        canonical_id: &str,
    ) -> Result<Vec<EntityKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT e.provider_id, e.entity_id FROM _sync_entity e
             JOIN _sync_entity_type t ON t.id = e.entity_type_id
             WHERE t.entity = ?1 AND e.canonical_id = ?2
             ORDER BY e.provider_id, e.entity_id",
        )?;
        let keys = stmt
            .query_map(params![entity_type, canonical_id], |row| {
                let provider_id: i64 = row.get(0)?;
                let id_json: String = row.get(1)?;
                let id: EntityId = parse_json(&id_json, "entity_id")?;
                Ok(EntityKey::new(provider_id, entity_type, id))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Persisted flags and JSON for an entity.
    pub fn entity_record(&self, key: &EntityKey) -> Result<Option<EntityRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT e.canonical_id, e.is_dirty, e.is_deleted, e.entity_json FROM _sync_entity e
             JOIN _sync_entity_type t ON t.id = e.entity_type_id
             WHERE e.provider_id = ?1 AND t.entity = ?2 AND e.entity_id = ?3",
            params![
                key.provider_id,
                key.entity_type,
                serde_json::to_string(&key.id)?
            ],
            |row| {
                let json: Option<String> = row.get(3)?;
                Ok(EntityRecord {
                    canonical_id: row.get(0)?,
                    is_dirty: row.get(1)?,
                    is_deleted: row.get(2)?,
                    json: json.map(|j| parse_json(&j, "entity_json")).transpose()?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Updates last-seen, and last-sync when `synced` (a complete list was read).
    pub fn touch_entity_type_state(
        &self,
        provider_id: i64,
        entity_type_id: i64,
        synced: bool,
    ) -> Result<()> {
        let mut run = self.run.lock();
        self.ensure_run(&mut run)?;
        let timestamp = now();
        let last_sync = synced.then_some(timestamp.as_str());
        self.conn.lock().execute(
            "INSERT INTO _sync_entity_type_state (provider_id, entity_type_id, last_seen, last_sync)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(provider_id, entity_type_id) DO UPDATE SET
                 last_seen = excluded.last_seen,
                 last_sync = COALESCE(excluded.last_sync, last_sync)",
            params![provider_id, entity_type_id, timestamp, last_sync],
        )?;
        Ok(())
    }

    pub fn entity_type_state(
        &self,
        provider_id: i64,
        entity_type: &str,
    ) -> Result<Option<EntityTypeState>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT s.last_seen, s.last_sync FROM _sync_entity_type_state s
             JOIN _sync_entity_type t ON t.id = s.entity_type_id
             WHERE s.provider_id = ?1 AND t.entity = ?2",
            params![provider_id, entity_type],
            |row| {
                let last_seen: String = row.get(0)?;
                Ok(EntityTypeState {
                    last_seen: parse_timestamp(&last_seen, "last_seen")?,
                    last_sync: parse_timestamp_opt(row.get(1)?, "last_sync")?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    /// Finalizes the open run. Later calls, and bookkeeping after close, are rejected or ignored.
    ///
    /// Calling `close` more than once is safe: only the first call writes.
    pub fn close(&self, exit_status: i32) -> Result<()> {
        let mut run = self.run.lock();
        if run.closed {
            return Ok(());
        }
        run.closed = true;
        let Some(run_id) = run.id else {
            return Ok(());
        };

        self.conn.lock().execute(
            "UPDATE _sync_run SET finished_at = ?1, exit_status = ?2, error_count = ?3,
                 warning_count = ?4, errors_json = ?5
             WHERE id = ?6",
            params![
                now(),
                exit_status,
                run.error_count,
                run.warning_count,
                serde_json::to_string(&run.errors)?,
                run_id
            ],
        )?;
        info!(
            run = ?run.uuid,
            exit_status,
            errors = run.error_count,
            warnings = run.warning_count,
            "closed run"
        );
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut stmt = conn.prepare(
            "SELECT id, run_uuid, command, arguments_json, started_at, finished_at, exit_status,
                    error_count, warning_count, errors_json
             FROM _sync_run ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map([limit], run_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn get_run(&self, uuid: &str) -> Result<RunRecord> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, run_uuid, command, arguments_json, started_at, finished_at, exit_status,
                    error_count, warning_count, errors_json
             FROM _sync_run WHERE run_uuid = ?1",
            [uuid],
            run_from_row,
        )
        .optional()?
        .ok_or_else(|| Error::RunNotFound(uuid.to_string()))
    }
}

fn run_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<RunRecord, rusqlite::Error> {
    let arguments: String = row.get(3)?;
    let started_at: String = row.get(4)?;
    let errors: Option<String> = row.get(9)?;
    Ok(RunRecord {
        id: row.get(0)?,
        uuid: row.get(1)?,
        command: row.get(2)?,
        arguments: parse_json(&arguments, "arguments_json")?,
        started_at: parse_timestamp(&started_at, "started_at")?,
        finished_at: parse_timestamp_opt(row.get(5)?, "finished_at")?,
        exit_status: row.get(6)?,
        error_count: row.get(7)?,
        warning_count: row.get(8)?,
        errors: match errors {
            Some(json) => parse_json(&json, "errors_json")?,
            None => Vec::new(),
        },
    })
}

impl Drop for Store {
    fn drop(&mut self) {
        let open = {
            let run = self.run.lock();
            run.id.is_some() && !run.closed
        };
        if open {
            warn!("run was not closed; finalizing with exit status 1");
            if let Err(err) = self.close(1) {
                error!(error = %err, "failed to finalize run");
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.config.path)
            .field("run", &self.run_uuid())
            .finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
