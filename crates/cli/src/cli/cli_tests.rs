// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use clap::CommandFactory;
use yare::parameterized;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("tether").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_runs_defaults() {
    match parse(&["runs"]).command {
        Command::Runs { limits, output } => {
            assert_eq!(limits.resolve(), Some(LimitArgs::DEFAULT));
            assert_eq!(output.format, OutputFormat::Text);
        }
        other => panic!("expected runs, got {other:?}"),
    }
}

#[parameterized(
    short_limit = { &["runs", "-n", "5"], Some(5) },
    long_limit = { &["runs", "--limit", "3"], Some(3) },
    no_limit = { &["runs", "--no-limit"], None },
)]
fn test_runs_limits(args: &[&str], expected: Option<usize>) {
    match parse(args).command {
        Command::Runs { limits, .. } => assert_eq!(limits.resolve(), expected),
        other => panic!("expected runs, got {other:?}"),
    }
}

#[test]
fn test_limit_conflicts_with_no_limit() {
    assert!(Cli::try_parse_from(["tether", "runs", "-n", "5", "--no-limit"]).is_err());
}

#[test]
fn test_json_format() {
    match parse(&["run", "abc", "--format", "json"]).command {
        Command::Run { uuid, output } => {
            assert_eq!(uuid, "abc");
            assert_eq!(output.format, OutputFormat::Json);
        }
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn test_run_requires_uuid() {
    assert!(Cli::try_parse_from(["tether", "run"]).is_err());
    assert!(Cli::try_parse_from(["tether", "run", " "]).is_err());
}

#[test]
fn test_namespace_add() {
    match parse(&["namespace", "add", "acme", "https://acme.test/", "acme"]).command {
        Command::Namespace(NamespaceCommand::Add {
            prefix,
            base_uri,
            type_namespace,
        }) => {
            assert_eq!(prefix, "acme");
            assert_eq!(base_uri, "https://acme.test/");
            assert_eq!(type_namespace, "acme");
        }
        other => panic!("expected namespace add, got {other:?}"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["namespace", "sync", "--config", "a.toml", "-d", "b.db"]);
    assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
    assert_eq!(cli.database, Some(PathBuf::from("b.db")));
    assert!(matches!(cli.command, Command::Namespace(NamespaceCommand::Sync)));
}

#[test]
fn test_uri_rejects_empty_type() {
    assert!(Cli::try_parse_from(["tether", "uri", ""]).is_err());
}
