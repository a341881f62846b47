// src/engine/mod.rs

//! Monitoring engine for dagpoll.
//!
//! This module ties together:
//! - the invocation probe (what the store says about running instances)
//! - the pure reconciliation core (resolve, diff, cascade, finalize)
//! - the async monitor loop and its log monitors
//! - the shutdown coordinator
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::errors::{DagpollError, Result};
use crate::types::FunctionStatus;

/// Join bound used by `shutdown(None)` when no explicit timeout is given
/// and the options carry none.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Options shared by the core and the async shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    /// Sleep between two reconciliation ticks.
    pub check_interval: Duration,
    /// Inactivity timeout: the run ends after this long without any status
    /// change anywhere in the graph.
    pub timeout: Duration,
    /// Echo function log lines through `tracing`.
    pub stream_logs: bool,
    pub log_poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
            stream_logs: false,
            log_poll_interval: Duration::from_secs(3),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl MonitorOptions {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("check_interval", self.check_interval),
            ("timeout", self.timeout),
            ("log_poll_interval", self.log_poll_interval),
        ];
        for (field, value) in fields {
            if value.is_zero() {
                return Err(DagpollError::Initialization(format!(
                    "monitor option `{field}` must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// One committed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub instance: String,
    pub from: FunctionStatus,
    pub to: FunctionStatus,
}

/// What the monitor loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep polling.
    Continue,
    /// Every instance is COMPLETED or NOT_INVOKED.
    AllCompleted,
    /// An instance failed and the rest of the run was skipped.
    Failed,
}

/// Why the monitor loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    AllCompleted,
    Failed,
    ShutdownRequested,
    TimedOut,
}

pub mod core;
pub mod probe;
pub mod runtime;
pub mod shutdown;
pub mod snapshot;

pub use core::{MonitorCore, TickReport};
pub use probe::{InvocationProbe, Observation, StoreProbe};
pub use runtime::{WorkflowMonitor, WorkflowMonitorBuilder};
pub use shutdown::{InterruptOutcome, handle_interrupts};
pub use snapshot::StatusSnapshot;
