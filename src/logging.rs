// src/logging.rs

//! Logging setup for `dagpoll` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `DAGPOLL_LOG`, parsed as `EnvFilter` directives, e.g.
//!    `info,dagpoll::function_log=off` to hide streamed function logs
//! 3. `info`
//!
//! Logs are sent to STDERR; stdout carries the status report.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "DAGPOLL_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Initialise the global logging subscriber. Only the binary calls this.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env_value.as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

/// Build the subscriber filter from the CLI level and the raw value of
/// `DAGPOLL_LOG`. Malformed directives are an error rather than silently
/// falling back.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level.directive()));
    }

    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| anyhow!("invalid {LOG_ENV} value {directives:?}: {e}")),
        None => Ok(EnvFilter::new(DEFAULT_DIRECTIVES)),
    }
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
