// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use tether_core::{Namespace, RunRecord, SyncErrorRecord};

/// Format a timestamp in UTC without sub-second precision.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Short status of a run: `open`, `ok`, or `exit N`.
pub fn run_status(run: &RunRecord) -> String {
    match (run.is_open(), run.exit_status) {
        (true, _) => "open".to_string(),
        (false, Some(0)) => "ok".to_string(),
        (false, Some(code)) => format!("exit {code}"),
        (false, None) => "closed".to_string(),
    }
}

/// The command line a run was started with; arguments containing
/// whitespace are quoted.
pub fn format_command_line(command: &str, arguments: &[String]) -> String {
    let mut line = command.to_string();
    for arg in arguments {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push_str(&format!("{arg:?}"));
        } else {
            line.push_str(arg);
        }
    }
    line
}

fn plural(count: u32, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// One line per run for `tether runs`.
///
/// ```text
/// 6f1c...  2026-01-10 10:30:00  ok      2 errors, 1 warning  sync --full
/// ```
pub fn format_run_line(run: &RunRecord) -> String {
    format!(
        "{}  {}  {:<7} {}, {}  {}",
        run.uuid,
        format_timestamp(&run.started_at),
        run_status(run),
        plural(run.error_count, "error"),
        plural(run.warning_count, "warning"),
        format_command_line(&run.command, &run.arguments)
    )
}

/// Full view of one run, its error log last.
pub fn format_run(run: &RunRecord) -> Vec<String> {
    let mut lines = vec![
        format!("Run {}", run.uuid),
        format!(
            "  Command:  {}",
            format_command_line(&run.command, &run.arguments)
        ),
        format!("  Started:  {}", format_timestamp(&run.started_at)),
    ];
    match &run.finished_at {
        Some(at) => lines.push(format!(
            "  Finished: {} ({})",
            format_timestamp(at),
            run_status(run)
        )),
        None => lines.push("  Finished: still open".to_string()),
    }
    lines.push(format!(
        "  Problems: {}, {}",
        plural(run.error_count, "error"),
        plural(run.warning_count, "warning")
    ));

    if !run.errors.is_empty() {
        lines.push(String::new());
        lines.push("Log:".to_string());
        for record in &run.errors {
            lines.extend(format_error(record));
        }
    }
    lines
}

/// A recorded sync error: a tag line, then the indented message.
///
/// ```text
///   [error] entity_not_found acme::User 404 (x2)
///     acme has no acme::User 404
/// ```
pub fn format_error(record: &SyncErrorRecord) -> Vec<String> {
    let error = &record.error;
    let mut tag = format!("  [{}] {}", error.level, error.error_type);
    if let Some(entity_type) = &error.entity_type {
        tag.push(' ');
        tag.push_str(entity_type);
    }
    if let Some(id) = &error.entity_id {
        tag.push_str(&format!(" {id}"));
    }
    if record.count > 1 {
        tag.push_str(&format!(" (x{})", record.count));
    }

    let mut lines = vec![tag];
    lines.extend(error.message.lines().map(|line| format!("    {line}")));
    lines
}

/// One line per namespace for `tether namespace list`.
pub fn format_namespace(namespace: &Namespace) -> String {
    format!(
        "{:<12} {:<24} {}",
        namespace.prefix, namespace.type_namespace, namespace.base_uri
    )
}

#[cfg(test)]
#[path = "display_tests.rs"]
mod tests;
