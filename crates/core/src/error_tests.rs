// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    unknown_type = { Error::UnknownEntityType("acme::User".into()), "acme::User" },
    circular = { Error::CircularReference("acme::Task#5".into()), "circular" },
    store_closed = { Error::StoreClosed, "closed" },
    transport = { Error::Transport("connection reset".into()), "connection reset" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn ambiguous_method_lists_candidates() {
    let err = Error::AmbiguousOperationMethod {
        entity: "acme::User".into(),
        operation: SyncOperation::Read,
        methods: vec!["get_user".into(), "fetch_user".into()],
    };
    let msg = err.to_string();
    assert!(msg.contains("get_user, fetch_user"));
    assert!(msg.contains("hint:"));
    assert!(err.is_configuration());
    assert!(!err.is_recoverable());
}

#[test]
fn not_found_covers_sync_and_http() {
    let sync: Error = SyncError::new(SyncErrorType::EntityNotFound, "gone").into();
    assert!(sync.is_not_found());
    assert!(sync.is_recoverable());

    let http = Error::Http {
        status: 404,
        message: "Not Found".into(),
    };
    assert!(http.is_not_found());

    let server = Error::Http {
        status: 500,
        message: "boom".into(),
    };
    assert!(!server.is_not_found());
    assert!(!server.is_recoverable());
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
