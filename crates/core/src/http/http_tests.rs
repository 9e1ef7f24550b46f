// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

use crate::test_support::MockHttpClient;

#[parameterized(
    read = { SyncOperation::Read, HttpMethod::Get },
    read_list = { SyncOperation::ReadList, HttpMethod::Get },
    create = { SyncOperation::Create, HttpMethod::Post },
    create_list = { SyncOperation::CreateList, HttpMethod::Post },
    update = { SyncOperation::Update, HttpMethod::Put },
    delete_list = { SyncOperation::DeleteList, HttpMethod::Delete },
)]
fn verbs_follow_operations(operation: SyncOperation, expected: HttpMethod) {
    assert_eq!(HttpMethod::for_operation(operation), expected);
}

#[test]
fn target_appends_encoded_query() {
    let mut request = HttpRequest::new(HttpMethod::Get, "https://api.test/tasks");
    request.query = vec![
        ("id".to_string(), "5,9".to_string()),
        ("q".to_string(), "a b".to_string()),
    ];
    assert_eq!(request.target().unwrap(), "https://api.test/tasks?id=5%2C9&q=a+b");

    let bare = HttpRequest::new(HttpMethod::Get, "https://api.test/tasks");
    assert_eq!(bare.target().unwrap(), "https://api.test/tasks");
}

#[test]
fn invalid_urls_are_transport_errors() {
    let request = HttpRequest::new(HttpMethod::Get, "not a url");
    assert!(matches!(request.target(), Err(Error::Transport(_))));
}

#[test]
fn headers_match_case_insensitively() {
    let mut request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
    request.headers.push(("Authorization".into(), "token a".into()));
    assert_eq!(request.header("authorization"), Some("token a"));
    assert_eq!(request.header("accept"), None);
}

#[test]
fn cache_keys_cover_vary_headers_only() {
    let request = |token: &str, agent: &str| {
        let mut request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
        request.headers = vec![
            ("Authorization".into(), token.into()),
            ("User-Agent".into(), agent.into()),
        ];
        request.cache = Some(CacheSpec {
            expiry: Expiry::Forever,
            vary: vec!["Authorization".into()],
        });
        request
    };

    let key = request("a", "x").cache_key().unwrap();
    assert_eq!(key.len(), 64);
    assert_eq!(key, request("a", "y").cache_key().unwrap());
    assert_ne!(key, request("b", "x").cache_key().unwrap());

    let mut post = request("a", "x");
    post.method = HttpMethod::Post;
    assert_ne!(key, post.cache_key().unwrap());
}

#[parameterized(
    object_message = { json!({"message": "gone"}), "gone" },
    object_error = { json!({"error": "denied"}), "denied" },
    string = { json!("teapot"), "teapot" },
    other = { json!([1, 2]), "request failed" },
)]
fn error_statuses_carry_the_backend_message(body: Value, expected: &str) {
    let response = HttpResponse {
        status: 418,
        headers: Vec::new(),
        body,
    };
    match response.error_for_status() {
        Err(Error::Http { status, message }) => {
            assert_eq!(status, 418);
            assert_eq!(message, expected);
        }
        other => panic!("expected an http error, got {other:?}"),
    }
}

#[test]
fn success_statuses_pass_through() {
    let response = HttpResponse::ok(json!({"id": 1}));
    assert_eq!(response.clone().error_for_status().unwrap(), response);
}

#[test]
fn backend_urls_join_paths() {
    let backend = HttpBackend::new("https://api.test/", Arc::new(MockHttpClient::new()));
    assert_eq!(backend.base_url(), "https://api.test");
    assert_eq!(backend.url("/users/1"), "https://api.test/users/1");
    assert_eq!(backend.url("tasks"), "https://api.test/tasks");
}

fn cached_get(expiry: Expiry) -> HttpRequest {
    let mut request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
    request.cache = Some(CacheSpec {
        expiry,
        vary: Vec::new(),
    });
    request
}

#[test]
fn caching_client_reuses_successful_gets() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route(
        HttpMethod::Get,
        "https://api.test/users",
        HttpResponse::ok(json!([{"id": 1}])),
    );
    let client = CachingHttpClient::new(Arc::clone(&mock));

    let request = cached_get(Expiry::Forever);
    let first = client.send(&request).unwrap();
    let second = client.send(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!(mock.count(), 1);
    assert_eq!(client.len(), 1);

    client.clear();
    assert!(client.is_empty());
    client.send(&request).unwrap();
    assert_eq!(mock.count(), 2);
}

#[test]
fn caching_client_skips_uncacheable_requests() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route(
        HttpMethod::Get,
        "https://api.test/users",
        HttpResponse::ok(json!([])),
    );
    let client = CachingHttpClient::new(Arc::clone(&mock));

    // Uncacheable requests pass straight through.
    client.send(&cached_get(Expiry::Never)).unwrap();
    client
        .send(&HttpRequest::new(HttpMethod::Get, "https://api.test/users"))
        .unwrap();
    let mut post = cached_get(Expiry::Forever);
    post.method = HttpMethod::Post;
    client.send(&post).unwrap();
    let mut missing = cached_get(Expiry::Forever);
    missing.url = "https://api.test/missing".into();
    assert_eq!(client.send(&missing).unwrap().status, 404);

    assert!(client.is_empty());
    assert_eq!(client.inner().count(), 4);
}

#[test]
fn caching_client_expires_entries() {
    let mock = Arc::new(MockHttpClient::new());
    mock.route(
        HttpMethod::Get,
        "https://api.test/users",
        HttpResponse::ok(json!([])),
    );
    let client = CachingHttpClient::new(Arc::clone(&mock));

    let request = cached_get(Expiry::For(Duration::ZERO));
    client.send(&request).unwrap();
    client.send(&request).unwrap();
    assert_eq!(mock.count(), 2);
}

#[test]
fn single_page_normalizes_bodies() {
    let request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
    let page = |body| SinglePage.page(&request, HttpResponse::ok(body)).unwrap();

    assert_eq!(page(json!([{"id": 1}, {"id": 2}])).records.len(), 2);
    assert_eq!(page(json!({"id": 1})).records, vec![json!({"id": 1})]);
    assert!(page(Value::Null).records.is_empty());
    assert_eq!(page(json!([])).next, None);
}

#[test]
fn next_link_pager_follows_links() {
    let mut request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
    request.query = vec![("active".into(), "true".into())];
    let pager = JsonNextLinkPager::default();

    let page = pager
        .page(
            &request,
            HttpResponse::ok(json!({"data": [{"id": 1}], "next": "https://api.test/users?page=2"})),
        )
        .unwrap();
    assert_eq!(page.records, vec![json!({"id": 1})]);
    let next = page.next.unwrap();
    assert_eq!(next.url, "https://api.test/users?page=2");
    assert!(next.query.is_empty());
    assert_eq!(next.method, HttpMethod::Get);

    let last = pager
        .page(&request, HttpResponse::ok(json!({"data": [], "next": ""})))
        .unwrap();
    assert!(last.records.is_empty());
    assert_eq!(last.next, None);
}

#[test]
fn next_link_pager_rejects_other_shapes() {
    let request = HttpRequest::new(HttpMethod::Get, "https://api.test/users");
    let pager = JsonNextLinkPager::new("items", "next_url");
    assert!(pager
        .page(&request, HttpResponse::ok(json!([{"id": 1}])))
        .is_err());
    assert!(pager
        .page(&request, HttpResponse::ok(json!({"items": {"id": 1}})))
        .is_err());
    assert!(pager
        .page(&request, HttpResponse::ok(json!({"items": null})))
        .unwrap()
        .records
        .is_empty());
}
