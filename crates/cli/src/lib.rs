// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether - inspect sync runs and manage entity namespaces.
//!
//! This crate backs the `tether` command line. It reads the store database
//! written by [`tether_core`]: runs and their error logs, and the namespaces
//! that turn entity types into URIs.
//!
//! # Main Components
//!
//! - [`Cli`] - argument parsing
//! - [`Config`] - `tether.toml` discovery and database resolution
//! - [`Settings`] - resolved config and database shared by every command
//! - [`Error`] - errors reported to the user
//!
//! ```rust,ignore
//! use clap::Parser;
//!
//! let cli = tether_cli::Cli::parse();
//! tether_cli::run(cli)?;
//! ```

mod cli;
mod commands;
mod display;

pub mod config;
pub mod env;
pub mod error;
pub mod logging;

pub use cli::{Cli, Command, FormatArgs, LimitArgs, NamespaceCommand, OutputFormat};
pub use commands::Settings;
pub use config::Config;
pub use error::{Error, Result};

/// Execute a CLI command. This is the main entry point for library users
/// and provides a testable way to run commands without process execution.
pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::resolve(cli.config.as_deref(), cli.database.as_deref())?;
    match cli.command {
        Command::Runs { limits, output } => {
            commands::runs::list(&settings, limits.resolve(), output.format)
        }
        Command::Run { uuid, output } => commands::runs::show(&settings, &uuid, output.format),
        Command::Namespace(NamespaceCommand::Add {
            prefix,
            base_uri,
            type_namespace,
        }) => commands::namespace::add(&settings, &prefix, &base_uri, &type_namespace),
        Command::Namespace(NamespaceCommand::List { output }) => {
            commands::namespace::list(&settings, output.format)
        }
        Command::Namespace(NamespaceCommand::Sync) => commands::namespace::sync(&settings),
        Command::Uri { entity_type } => commands::uri::run(&settings, &entity_type),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
