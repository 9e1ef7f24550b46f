// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! The variable name constants are generated by `build.rs` and live in the
//! [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `TETHER_DB` if set and non-empty.
pub fn tether_db() -> Option<PathBuf> {
    non_empty(vars::TETHER_DB).map(PathBuf::from)
}

/// Returns `true` if `NO_COLOR` is set to anything but the empty string.
pub fn no_color() -> bool {
    non_empty(vars::NO_COLOR).is_some()
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
