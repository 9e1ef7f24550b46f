// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures: the `acme` entity types, an in-memory provider with
//! declared methods, and a scripted HTTP client.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::context::Context;
use crate::definition::DefinitionBuilder;
use crate::entity::{EntityType, FieldDef, FieldKind, Relationship};
use crate::error::{Error, Result};
use crate::http::{HttpBackend, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::introspect::Introspector;
use crate::naming::method_key;
use crate::operation::OperationArgs;
use crate::provider::{MethodDecl, MethodOutput, Provider, SyncProvider};
use crate::serialize::{serialize, SerializeRules};
use crate::store::Store;

pub(crate) const ACME_URL: &str = "https://api.test";

pub(crate) fn entity_types() -> Vec<EntityType> {
    vec![
        EntityType::new("acme::User")
            .with_field(FieldDef::new("name", FieldKind::String).constructor())
            .with_field(FieldDef::new("email", FieldKind::String))
            .with_field(FieldDef::new("createdAt", FieldKind::Timestamp).read_only())
            .with_relationship(Relationship::one_to_many("tasks", "acme::Task"))
            .with_relationship(Relationship::one_to_one("manager", "acme::User")),
        EntityType::new("acme::Task")
            .with_field(
                FieldDef::new("title", FieldKind::String)
                    .constructor()
                    .with_default(json!("untitled")),
            )
            .with_field(FieldDef::new("done", FieldKind::Bool))
            .with_relationship(Relationship::one_to_one("user", "acme::User"))
            .with_relationship(Relationship::one_to_one("project", "acme::Project")),
        EntityType::new("acme::Project")
            .with_field(FieldDef::new("name", FieldKind::String))
            .with_relationship(
                Relationship::one_to_many("tasks", "acme::Task").with_inverse("project"),
            ),
        EntityType::new("acme::Folder")
            .with_field(FieldDef::new("name", FieldKind::String))
            .with_parent("parent")
            .with_children("children")
            .extensible(),
    ]
}

pub(crate) fn introspector() -> Arc<Introspector> {
    let introspector = Introspector::new();
    for decl in entity_types() {
        introspector.register(decl).unwrap();
    }
    Arc::new(introspector)
}

fn fixtures(entity_type: &str) -> Vec<Value> {
    match entity_type {
        "acme::User" => vec![
            json!({"id": 1, "name": "Ada", "tasks": [5, 9], "manager": 2}),
            json!({"id": 2, "name": "Grace", "manager": 1}),
            json!({"id": 3, "name": "Linus"}),
        ],
        "acme::Task" => vec![
            json!({"id": 5, "title": "Write", "done": false, "user": 1, "project": 3}),
            json!({"id": 9, "title": "Review", "done": true, "user": 1, "project": 3}),
            json!({"id": 12, "title": "Ship", "done": false, "user": 2, "project": 4}),
        ],
        "acme::Project" => vec![
            json!({"id": 3, "name": "Launch"}),
            json!({"id": 4, "name": "Maintenance"}),
        ],
        "acme::Folder" => vec![
            json!({"id": 1, "name": "root", "parent": null}),
            json!({"id": 2, "name": "docs", "parent": 1}),
            json!({"id": 3, "name": "drafts", "parent": 2}),
        ],
        _ => Vec::new(),
    }
}

fn matches_filters(record: &Value, ctx: &Context) -> bool {
    ctx.filters().iter().all(|(key, wanted)| {
        let actual = record.get(key).unwrap_or(&Value::Null);
        match wanted {
            Value::Array(options) => options.contains(actual),
            other => other == actual,
        }
    })
}

/// In-memory provider with declared methods and a call log.
pub(crate) struct AcmeProvider {
    backend: String,
    task_lists: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl AcmeProvider {
    pub(crate) fn new() -> Self {
        AcmeProvider {
            backend: ACME_URL.to_string(),
            task_lists: true,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    /// Drops the task list method so lists fall back to per-id reads.
    pub(crate) fn without_task_lists(mut self) -> Self {
        self.task_lists = false;
        self
    }

    /// Slows every call down so concurrent callers overlap.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Method keys of every call so far.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self, method: &str) -> usize {
        let key = method_key(method);
        self.calls.lock().iter().filter(|c| **c == key).count()
    }

    fn find(&self, entity_type: &str, args: &OperationArgs) -> MethodOutput {
        let Some(id) = &args.id else {
            return MethodOutput::Empty;
        };
        fixtures(entity_type)
            .into_iter()
            .find(|record| record.get("id") == Some(&id.to_value()))
            .map_or(MethodOutput::Empty, MethodOutput::Record)
    }

    fn list(&self, entity_type: &str, ctx: &Context) -> MethodOutput {
        let records: Vec<Value> = fixtures(entity_type)
            .into_iter()
            .filter(|record| matches_filters(record, ctx))
            .collect();
        MethodOutput::Records(Box::new(records.into_iter().map(Ok)))
    }
}

impl Provider for AcmeProvider {
    fn name(&self) -> &str {
        "acme"
    }

    fn backend_identifier(&self) -> Vec<Value> {
        vec![json!(self.backend)]
    }

    fn entity_types(&self) -> Vec<String> {
        ["acme::User", "acme::Task", "acme::Project", "acme::Folder"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn methods(&self) -> Vec<MethodDecl> {
        let mut methods = vec![
            MethodDecl::new("get_user"),
            MethodDecl::new("getUsers"),
            MethodDecl::new("get_task"),
            MethodDecl::new("createTask"),
            MethodDecl::new("delete_task"),
            MethodDecl::new("get_project"),
            MethodDecl::new("get_folder"),
            MethodDecl::new("get_folders"),
        ];
        if self.task_lists {
            methods.push(MethodDecl::new("get_tasks"));
        }
        methods
    }

    fn call(&self, method: &str, ctx: &Context, args: &OperationArgs) -> Result<MethodOutput> {
        let key = method_key(method);
        self.calls.lock().push(key.clone());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match key.as_str() {
            "getuser" => Ok(self.find("acme::User", args)),
            "getusers" => Ok(self.list("acme::User", ctx)),
            "gettask" => Ok(self.find("acme::Task", args)),
            "gettasks" if self.task_lists => Ok(self.list("acme::Task", ctx)),
            "createtask" => {
                let handle = args.entity.clone().unwrap();
                let mut record = serialize(&handle, &SerializeRules::default());
                record["id"] = json!(100);
                Ok(MethodOutput::Record(record))
            }
            "deletetask" => Ok(MethodOutput::Empty),
            "getproject" => Ok(self.find("acme::Project", args)),
            "getfolder" => Ok(self.find("acme::Folder", args)),
            "getfolders" => Ok(self.list("acme::Folder", ctx)),
            _ => Err(Error::UndefinedMethod {
                provider: "acme".into(),
                method: method.to_string(),
            }),
        }
    }
}

/// A registered [`AcmeProvider`] over an in-memory store.
pub(crate) struct TestEnv {
    pub store: Arc<Store>,
    pub introspector: Arc<Introspector>,
    pub acme: Arc<AcmeProvider>,
    pub provider: Arc<SyncProvider>,
    pub ctx: Context,
}

pub(crate) fn setup() -> TestEnv {
    setup_with(AcmeProvider::new())
}

pub(crate) fn setup_with(acme: AcmeProvider) -> TestEnv {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let introspector = introspector();
    let acme = Arc::new(acme);
    let provider = SyncProvider::register_arc(
        Arc::clone(&acme) as Arc<dyn Provider>,
        &store,
        &introspector,
    )
    .unwrap();
    TestEnv {
        store,
        introspector,
        acme,
        provider,
        ctx: Context::new(),
    }
}

/// Scripted HTTP client; unrouted requests answer 404.
#[derive(Default)]
pub(crate) struct MockHttpClient {
    routes: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answers `method target` (query string included) with `response`.
    pub(crate) fn route(&self, method: HttpMethod, target: &str, response: HttpResponse) {
        self.routes
            .lock()
            .insert(format!("{method} {target}"), response);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let key = format!("{} {}", request.method, request.target()?);
        self.requests.lock().push(request.clone());
        Ok(self.routes.lock().get(&key).cloned().unwrap_or(HttpResponse {
            status: 404,
            headers: Vec::new(),
            body: json!({"message": "not found"}),
        }))
    }
}

/// HTTP provider for `acme::User` (`users/:id`) and `acme::Task` (`tasks`).
pub(crate) struct RestProvider {
    pub client: Arc<MockHttpClient>,
    configure: Box<dyn Fn(DefinitionBuilder) -> DefinitionBuilder + Send + Sync>,
}

impl RestProvider {
    pub(crate) fn new(client: &Arc<MockHttpClient>) -> Self {
        RestProvider {
            client: Arc::clone(client),
            configure: Box::new(|builder| builder),
        }
    }

    /// Extra definition settings applied after the default paths.
    pub(crate) fn with_definition<F>(mut self, configure: F) -> Self
    where
        F: Fn(DefinitionBuilder) -> DefinitionBuilder + Send + Sync + 'static,
    {
        self.configure = Box::new(configure);
        self
    }
}

impl Provider for RestProvider {
    fn name(&self) -> &str {
        "rest"
    }

    fn backend_identifier(&self) -> Vec<Value> {
        vec![json!(ACME_URL)]
    }

    fn entity_types(&self) -> Vec<String> {
        vec!["acme::User".into(), "acme::Task".into()]
    }

    fn define(&self, builder: DefinitionBuilder) -> DefinitionBuilder {
        let builder = match builder.entity().name() {
            "acme::User" => builder.with_path("users/:id"),
            _ => builder.with_path("tasks"),
        };
        (self.configure)(builder)
    }

    fn http(&self) -> Option<HttpBackend> {
        Some(HttpBackend::new(ACME_URL, Arc::clone(&self.client) as Arc<dyn HttpClient>))
    }
}

/// A registered [`RestProvider`], with the acme provider bound for the
/// types it does not service.
pub(crate) struct RestEnv {
    pub env: TestEnv,
    pub client: Arc<MockHttpClient>,
    pub rest: Arc<SyncProvider>,
    /// Owns the container; contexts only hold it weakly.
    pub container: Arc<crate::container::ServiceContainer>,
    pub ctx: Context,
}

pub(crate) fn setup_rest<F>(configure: F) -> RestEnv
where
    F: Fn(DefinitionBuilder) -> DefinitionBuilder + Send + Sync + 'static,
{
    let env = setup();
    let client = Arc::new(MockHttpClient::new());
    let rest = SyncProvider::register(
        RestProvider::new(&client).with_definition(configure),
        &env.store,
        &env.introspector,
    )
    .unwrap();
    let container = Arc::new(crate::container::ServiceContainer::new());
    container.bind_all(&env.provider);
    container.bind_all(&rest);
    let ctx = Context::new().with_container(&container);
    RestEnv {
        env,
        client,
        rest,
        container,
        ctx,
    }
}
