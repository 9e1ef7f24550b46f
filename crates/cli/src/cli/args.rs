// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared argument structs for CLI commands.

use clap::{Args, ValueEnum};

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Clone, Copy, Debug, Default)]
pub struct FormatArgs {
    /// Output format
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Limit arguments for run listings.
#[derive(Args, Clone, Debug, Default)]
pub struct LimitArgs {
    /// Maximum number of results
    #[arg(short = 'n', long, conflicts_with = "no_limit")]
    pub limit: Option<usize>,

    /// Show every result
    #[arg(long, conflicts_with = "limit")]
    pub no_limit: bool,
}

impl LimitArgs {
    pub const DEFAULT: usize = 20;

    /// The effective limit; `None` means unlimited.
    pub fn resolve(&self) -> Option<usize> {
        if self.no_limit {
            None
        } else {
            Some(self.limit.unwrap_or(Self::DEFAULT))
        }
    }
}
