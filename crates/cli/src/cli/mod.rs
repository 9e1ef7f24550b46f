// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

mod args;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use args::{FormatArgs, LimitArgs, OutputFormat};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect sync runs and manage entity namespaces")]
#[command(
    long_about = "Inspect sync runs and manage entity namespaces.\n\n\
    Reads the store database written by tether-core: the runs each sync \
    process opened, the errors they recorded, and the namespaces that map \
    entity types to URIs."
)]
pub struct Cli {
    /// Config file (default: nearest tether.toml)
    #[arg(short = 'c', long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Store database (default: config `database`, $TETHER_DB, or the data directory)
    #[arg(short = 'd', long, global = true, value_name = "path")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List runs, newest first
    #[command(after_help = "\
Examples:
  tether runs                 Last 20 runs
  tether runs -n 5            Last 5 runs
  tether runs --no-limit      Every run
  tether runs -f json         Runs as JSON lines")]
    Runs {
        #[command(flatten)]
        limits: LimitArgs,

        #[command(flatten)]
        output: FormatArgs,
    },

    /// Show one run and its error log
    Run {
        /// Run UUID
        #[arg(value_parser = non_empty_string)]
        uuid: String,

        #[command(flatten)]
        output: FormatArgs,
    },

    /// Manage entity namespaces
    #[command(subcommand)]
    Namespace(NamespaceCommand),

    /// Print the compact and full URI of an entity type
    #[command(after_help = "\
Examples:
  tether uri acme::Task       Prints acme:Task, then https://schema.acme.test/Task")]
    Uri {
        /// Entity type, e.g. acme::crm::Lead
        #[arg(value_parser = non_empty_string)]
        entity_type: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum NamespaceCommand {
    /// Register a namespace, replacing any with the same prefix
    Add {
        /// Compact URI prefix (letters, digits, '-' and '_')
        prefix: String,
        /// Base URI the type path is appended to
        base_uri: String,
        /// Entity type namespace, e.g. acme::crm
        type_namespace: String,
    },

    /// List registered namespaces
    List {
        #[command(flatten)]
        output: FormatArgs,
    },

    /// Register every [[namespace]] table from the config file
    Sync,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
