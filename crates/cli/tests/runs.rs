// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

mod common;
use common::*;
use tether_core::{SyncError, SyncErrorType};

fn missing_user() -> SyncError {
    SyncError::new(SyncErrorType::EntityNotFound, "acme has no acme::User 404")
        .with_entity("acme::User", Some(404.into()))
}

#[test]
fn runs_empty_store() {
    let temp = TempDir::new().unwrap();
    tether(&temp)
        .arg("runs")
        .assert()
        .success()
        .stdout("No runs\n");
}

#[test]
fn runs_lists_recorded_runs() {
    let temp = TempDir::new().unwrap();
    let first = record_run(&temp, "import", &[missing_user()], 0);
    let second = record_run(&temp, "export", &[], 2);

    let output = tether(&temp).arg("runs").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&second));
    assert!(lines[0].contains("exit 2"));
    assert!(lines[1].starts_with(&first));
    assert!(lines[1].contains("1 error, 0 warnings"));
}

#[test]
fn runs_limit() {
    let temp = TempDir::new().unwrap();
    for _ in 0..3 {
        record_run(&temp, "import", &[missing_user()], 0);
    }

    let output = tether(&temp).args(["runs", "-n", "1"]).output().unwrap();
    assert_eq!(String::from_utf8(output.stdout).unwrap().lines().count(), 1);

    let output = tether(&temp).args(["runs", "--no-limit"]).output().unwrap();
    assert_eq!(String::from_utf8(output.stdout).unwrap().lines().count(), 3);
}

#[test]
fn runs_limit_conflicts_with_no_limit() {
    let temp = TempDir::new().unwrap();
    tether(&temp)
        .args(["runs", "-n", "2", "--no-limit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn runs_json_lines() {
    let temp = TempDir::new().unwrap();
    let uuid = record_run(&temp, "import", &[missing_user(), missing_user()], 0);

    let output = tether(&temp)
        .args(["runs", "--format", "json"])
        .output()
        .unwrap();
    let run: serde_json::Value =
        serde_json::from_str(String::from_utf8(output.stdout).unwrap().trim()).unwrap();
    assert_eq!(run["uuid"], uuid.as_str());
    assert_eq!(run["errors"][0]["count"], 2);
    assert_eq!(run["errors"][0]["entity_id"], 404);
}

#[test]
fn run_shows_error_log() {
    let temp = TempDir::new().unwrap();
    let uuid = record_run(&temp, "import", &[missing_user()], 0);

    tether(&temp)
        .args(["run", &uuid])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!("Run {uuid}\n")))
        .stdout(predicate::str::contains("Log:\n"))
        .stdout(predicate::str::contains(
            "  [error] entity_not_found acme::User 404\n",
        ));
}

#[test]
fn run_unknown_uuid_fails() {
    let temp = TempDir::new().unwrap();
    tether(&temp)
        .args(["run", "no-such-run"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error: "))
        .stderr(predicate::str::contains("no-such-run"));
}

#[test]
fn database_flag_overrides_env() {
    let temp = TempDir::new().unwrap();
    record_run(&temp, "import", &[missing_user()], 0);
    let other = temp.path().join("other.db");

    tether(&temp)
        .args(["runs", "--database", other.to_str().unwrap()])
        .assert()
        .success()
        .stdout("No runs\n");
    assert!(other.exists());
}

#[test]
fn inspection_does_not_record_a_run() {
    let temp = TempDir::new().unwrap();
    tether(&temp).arg("runs").assert().success();
    tether(&temp).arg("runs").assert().success().stdout("No runs\n");
}
