//! Command-line interface for trendforge.
//!
//! Provides the `run` command that drives one pipeline run from the shell.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands, RunArgs, SandboxKind};
