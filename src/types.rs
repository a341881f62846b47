// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Observed status of one function instance.
///
/// Transitions only move forward:
/// `Pending -> {Invoked, NotInvoked} -> Running -> {Completed, Failed}`, and
/// any non-final status may be forced to `Skipped` or `Timeout` when the run
/// ends early. See [`FunctionStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    Pending,
    Invoked,
    NotInvoked,
    Running,
    Completed,
    Failed,
    Skipped,
    Timeout,
}

impl FunctionStatus {
    pub const ALL: [FunctionStatus; 8] = [
        FunctionStatus::Pending,
        FunctionStatus::Invoked,
        FunctionStatus::NotInvoked,
        FunctionStatus::Running,
        FunctionStatus::Completed,
        FunctionStatus::Failed,
        FunctionStatus::Skipped,
        FunctionStatus::Timeout,
    ];

    /// Final statuses never change again for the rest of the run.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            FunctionStatus::Completed
                | FunctionStatus::Failed
                | FunctionStatus::NotInvoked
                | FunctionStatus::Skipped
                | FunctionStatus::Timeout
        )
    }

    /// `Completed` or `NotInvoked`: the instance finished without blocking
    /// the workflow.
    pub fn is_success(self) -> bool {
        matches!(self, FunctionStatus::Completed | FunctionStatus::NotInvoked)
    }

    pub fn can_transition_to(self, next: FunctionStatus) -> bool {
        use FunctionStatus::*;

        if self.is_final() {
            return false;
        }

        match (self, next) {
            (current, next) if current == next => true,
            (_, Skipped) | (_, Timeout) => true,
            (Pending, Invoked) | (Pending, NotInvoked) => true,
            (Invoked, Running) | (Invoked, Completed) | (Invoked, Failed) => true,
            (Running, Completed) | (Running, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionStatus::Pending => "pending",
            FunctionStatus::Invoked => "invoked",
            FunctionStatus::NotInvoked => "not_invoked",
            FunctionStatus::Running => "running",
            FunctionStatus::Completed => "completed",
            FunctionStatus::Failed => "failed",
            FunctionStatus::Skipped => "skipped",
            FunctionStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        FunctionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("invalid function status: {s}"))
    }
}

/// Outcome of asking whether a pending instance was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    /// At least one invoker has not completed yet; nothing can be decided.
    Pending,
    /// Some completed invoker invoked this function.
    Invoked,
    /// Every invoker completed and none of them invoked this function.
    NotInvoked,
}

impl InvocationStatus {
    /// The status to commit for this outcome, if it is decisive.
    pub fn decided_status(self) -> Option<FunctionStatus> {
        match self {
            InvocationStatus::Pending => None,
            InvocationStatus::Invoked => Some(FunctionStatus::Invoked),
            InvocationStatus::NotInvoked => Some(FunctionStatus::NotInvoked),
        }
    }
}
