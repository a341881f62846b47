// src/logs/mod.rs

//! Per-instance log observation.
//!
//! A [`FunctionLogMonitor`] polls one instance's log artifact in the store
//! and reports what it sees as [`LogEvent`]s:
//!
//! `Created` once, then `Updated` for every poll that found new lines, then
//! `Complete` once after a stop was requested and a poll found nothing new.

use std::fmt;

pub mod monitor;

pub use monitor::FunctionLogMonitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEvent {
    /// The log artifact was observed for the first time.
    Created,
    /// New lines were appended to the buffered log.
    Updated,
    /// A stop was requested and no further lines appeared.
    Complete,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogEvent::Created => "log_created",
            LogEvent::Updated => "log_updated",
            LogEvent::Complete => "log_complete",
        };
        f.write_str(s)
    }
}

/// Subscriber to log events. Runs on the poll task, in registration order.
/// An error (or panic) is logged and does not affect other subscribers.
pub type LogCallback = dyn Fn(LogEvent) -> anyhow::Result<()> + Send + Sync;

/// Split artifact content into lines, ignoring leading/trailing blank space.
pub fn split_lines(content: &str) -> Vec<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect()
}
