// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{self, Write};

use tether_core::Store;

use crate::cli::OutputFormat;
use crate::display::{format_run, format_run_line};
use crate::error::Result;

use super::Settings;

pub fn list(settings: &Settings, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let store = settings.open_store()?;
    list_impl(&store, limit, format, &mut io::stdout().lock())
}

/// Internal implementation that accepts the store and writer for testing.
pub(crate) fn list_impl(
    store: &Store,
    limit: Option<usize>,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let runs = store.list_runs(limit)?;
    match format {
        OutputFormat::Json => {
            for run in &runs {
                writeln!(out, "{}", serde_json::to_string(run)?)?;
            }
        }
        OutputFormat::Text if runs.is_empty() => writeln!(out, "No runs")?,
        OutputFormat::Text => {
            for run in &runs {
                writeln!(out, "{}", format_run_line(run))?;
            }
        }
    }
    Ok(())
}

pub fn show(settings: &Settings, uuid: &str, format: OutputFormat) -> Result<()> {
    let store = settings.open_store()?;
    show_impl(&store, uuid, format, &mut io::stdout().lock())
}

pub(crate) fn show_impl(
    store: &Store,
    uuid: &str,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let run = store.get_run(uuid.trim())?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&run)?)?,
        OutputFormat::Text => {
            for line in format_run(&run) {
                writeln!(out, "{line}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
