// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::{json, Value};

use crate::error::Error;
use crate::http::{HttpClient, HttpResponse};
use crate::provider::{MethodDecl, MethodOutput, Provider};
use crate::store::Store;
use crate::test_support::{introspector, MockHttpClient, ACME_URL};

/// Serves `acme::User` through any combination of the three closure sources.
struct Layered {
    client: Arc<MockHttpClient>,
    declared: bool,
    overridden: bool,
    path: bool,
    operations: Option<Vec<SyncOperation>>,
}

impl Layered {
    fn new(client: &Arc<MockHttpClient>) -> Self {
        Layered {
            client: Arc::clone(client),
            declared: false,
            overridden: false,
            path: false,
            operations: None,
        }
    }
}

impl Provider for Layered {
    fn name(&self) -> &str {
        "layered"
    }

    fn backend_identifier(&self) -> Vec<Value> {
        vec![json!(self.declared), json!(self.overridden), json!(self.path)]
    }

    fn entity_types(&self) -> Vec<String> {
        vec!["acme::User".into()]
    }

    fn methods(&self) -> Vec<MethodDecl> {
        if self.declared {
            vec![MethodDecl::new("get_user")]
        } else {
            Vec::new()
        }
    }

    fn call(&self, _method: &str, _ctx: &Context, args: &OperationArgs) -> Result<MethodOutput> {
        let id = args.id.clone().map(|id| id.to_value()).unwrap_or(Value::Null);
        Ok(MethodOutput::Record(json!({"id": id, "name": "declared"})))
    }

    fn define(&self, builder: DefinitionBuilder) -> DefinitionBuilder {
        let mut builder = builder;
        if self.path {
            builder = builder.with_path("users/:id");
        }
        if self.overridden {
            builder = builder.with_override(SyncOperation::Read, |provider, ctx, args| {
                let id = args.id.map(|id| id.to_value()).unwrap_or(Value::Null);
                provider
                    .provide("acme::User", ctx, json!({"id": id, "name": "override"}))
                    .map(OperationOutput::One)
            });
        }
        if let Some(operations) = &self.operations {
            builder = builder.with_operations(operations);
        }
        builder
    }

    fn http(&self) -> Option<HttpBackend> {
        Some(HttpBackend::new(ACME_URL, Arc::clone(&self.client) as Arc<dyn HttpClient>))
    }
}

fn read_name(layered: Layered) -> Result<Option<Value>> {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let provider = SyncProvider::register(layered, &store, &introspector()).unwrap();
    let user = provider
        .perform("acme::User", SyncOperation::Read, &Context::new(), OperationArgs::id(1))?
        .into_one()?;
    Ok(user.get("name"))
}

fn routed_client() -> Arc<MockHttpClient> {
    let client = Arc::new(MockHttpClient::new());
    client.route(
        HttpMethod::Get,
        "https://api.test/users/1",
        HttpResponse::ok(json!({"id": 1, "name": "http"})),
    );
    client
}

#[test]
fn overrides_win_over_declared_methods() {
    let client = routed_client();
    let layered = Layered {
        declared: true,
        overridden: true,
        path: true,
        ..Layered::new(&client)
    };
    assert_eq!(read_name(layered).unwrap(), Some(json!("override")));
    assert_eq!(client.count(), 0);
}

#[test]
fn declared_methods_win_over_generic_http() {
    let client = routed_client();
    let layered = Layered {
        declared: true,
        path: true,
        ..Layered::new(&client)
    };
    assert_eq!(read_name(layered).unwrap(), Some(json!("declared")));
    assert_eq!(client.count(), 0);
}

#[test]
fn generic_http_needs_a_path() {
    let client = routed_client();
    let layered = Layered {
        path: true,
        ..Layered::new(&client)
    };
    assert_eq!(read_name(layered).unwrap(), Some(json!("http")));
    assert_eq!(client.count(), 1);

    let err = read_name(Layered::new(&client)).unwrap_err();
    assert!(matches!(err, Error::OperationNotSupported { .. }));
}

#[test]
fn disabled_operations_are_unsupported() {
    let client = routed_client();
    let layered = Layered {
        declared: true,
        overridden: true,
        path: true,
        operations: Some(vec![SyncOperation::ReadList]),
        ..Layered::new(&client)
    };
    let err = read_name(layered).unwrap_err();
    assert!(matches!(
        err,
        Error::OperationNotSupported { operation: SyncOperation::Read, .. }
    ));
}

#[test]
fn closures_are_resolved_once_per_operation() {
    let client = routed_client();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let layered = Layered {
        declared: true,
        ..Layered::new(&client)
    };
    let provider = SyncProvider::register(layered, &store, &introspector()).unwrap();
    let definition = provider.definition("acme::User").unwrap();

    let a = definition.operation_closure(SyncOperation::Read).unwrap();
    let b = definition.operation_closure(SyncOperation::Read).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    assert!(definition.supports(SyncOperation::Read));
    assert!(!definition.supports(SyncOperation::Update));
    assert!(!definition.supports(SyncOperation::Update));
    assert_eq!(definition.entity().name(), "acme::User");
}
