// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagpoll`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagpoll",
    version,
    about = "Monitor a workflow of functions through the artifacts they leave in an object store.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    ///
    /// Default: `Workflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Workflow.toml")]
    pub config: String,

    /// Inactivity timeout in seconds; overrides `[monitor].timeout_secs`.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds between two status checks; overrides
    /// `[monitor].check_interval_secs`.
    #[arg(long, value_name = "SECS")]
    pub check_interval: Option<u64>,

    /// Echo function log lines as they appear.
    #[arg(long)]
    pub stream_logs: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGPOLL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the expanded instances, but don't monitor.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
