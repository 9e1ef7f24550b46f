// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{self, Write};

use tether_core::Store;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::display::format_namespace;
use crate::error::{Error, Result};

use super::Settings;

pub fn add(settings: &Settings, prefix: &str, base_uri: &str, type_namespace: &str) -> Result<()> {
    let store = settings.open_store()?;
    add_impl(&store, prefix, base_uri, type_namespace, &mut io::stdout().lock())
}

pub(crate) fn add_impl(
    store: &Store,
    prefix: &str,
    base_uri: &str,
    type_namespace: &str,
    out: &mut impl Write,
) -> Result<()> {
    store.register_namespace(prefix, base_uri, type_namespace)?;
    writeln!(out, "Registered {prefix}: {type_namespace} -> {base_uri}")?;
    Ok(())
}

pub fn list(settings: &Settings, format: OutputFormat) -> Result<()> {
    let store = settings.open_store()?;
    list_impl(&store, format, &mut io::stdout().lock())
}

pub(crate) fn list_impl(store: &Store, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let namespaces = store.list_namespaces()?;
    match format {
        OutputFormat::Json => {
            for namespace in &namespaces {
                writeln!(out, "{}", serde_json::to_string(namespace)?)?;
            }
        }
        OutputFormat::Text if namespaces.is_empty() => writeln!(out, "No namespaces")?,
        OutputFormat::Text => {
            for namespace in &namespaces {
                writeln!(out, "{}", format_namespace(namespace))?;
            }
        }
    }
    Ok(())
}

pub fn sync(settings: &Settings) -> Result<()> {
    let store = settings.open_store()?;
    sync_impl(&store, settings.config.as_ref(), &mut io::stdout().lock())
}

/// Registers every `[[namespace]]` table, stopping at the first invalid one.
pub(crate) fn sync_impl(
    store: &Store,
    config: Option<&Config>,
    out: &mut impl Write,
) -> Result<()> {
    let namespaces = config.map(|c| c.namespaces.as_slice()).unwrap_or_default();
    if namespaces.is_empty() {
        return Err(Error::NoNamespaces);
    }
    for namespace in namespaces {
        store.register_namespace(
            &namespace.prefix,
            &namespace.base_uri,
            &namespace.type_namespace,
        )?;
    }
    let noun = if namespaces.len() == 1 { "namespace" } else { "namespaces" };
    writeln!(out, "Registered {} {noun}", namespaces.len())?;
    Ok(())
}

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;
