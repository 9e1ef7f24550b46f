// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{self, Write};

use tether_core::Store;

use crate::error::{Error, Result};

use super::Settings;

pub fn run(settings: &Settings, entity_type: &str) -> Result<()> {
    let store = settings.open_store()?;
    run_impl(&store, entity_type, &mut io::stdout().lock())
}

/// Prints the compact URI, then the full URI, one per line.
pub(crate) fn run_impl(store: &Store, entity_type: &str, out: &mut impl Write) -> Result<()> {
    let entity_type = entity_type.trim();
    let uris = store
        .entity_uri(entity_type, true)
        .zip(store.entity_uri(entity_type, false));
    let Some((compact, full)) = uris else {
        return Err(Error::NoNamespace(entity_type.to_string()));
    };
    writeln!(out, "{compact}")?;
    writeln!(out, "{full}")?;
    Ok(())
}

#[cfg(test)]
#[path = "uri_tests.rs"]
mod tests;
