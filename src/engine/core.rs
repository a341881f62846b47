// src/engine/core.rs

//! Pure reconciliation core.
//!
//! [`MonitorCore`] owns the status table of one run and turns probe
//! observations into committed status changes:
//! - commit what the probe saw for invoked / running instances
//! - resolve every pending instance against its invokers
//! - cascade SKIPPED over the rest of the run once anything failed
//! - diff against the previous snapshot
//! - finalize leftovers as SKIPPED or TIMEOUT when the loop ends
//!
//! The async shell (`engine::runtime`) does the store IO and sleeping. The
//! core has no channels and performs no IO, so it can be driven tick by
//! tick from tests.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::dag::{InstanceId, InstanceTable, InvocationResolver, WorkflowGraph};
use crate::engine::probe::Observation;
use crate::engine::snapshot::StatusSnapshot;
use crate::engine::{StatusChange, TickOutcome};
use crate::errors::Result;
use crate::types::FunctionStatus;

/// Result of one reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub changes: Vec<StatusChange>,
    pub outcome: TickOutcome,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            changes: Vec::new(),
            outcome: TickOutcome::Continue,
        }
    }
}

/// Status table plus the two cooperative flags of a run.
#[derive(Debug)]
pub struct MonitorCore {
    graph: WorkflowGraph,
    table: InstanceTable,
    /// Statuses as of the last diff.
    previous: BTreeMap<String, FunctionStatus>,
    last_change: Instant,
    shutdown_requested: bool,
    monitoring_complete: bool,
}

impl MonitorCore {
    /// Build the status table for `graph`. Functions nobody invokes start
    /// out INVOKED; everything else starts PENDING. The first tick reports
    /// the roots' PENDING -> INVOKED change.
    pub fn new(graph: WorkflowGraph, now: Instant) -> Result<Self> {
        let mut table = InstanceTable::new(graph.instances());
        let previous = statuses_of(&table);

        let roots: Vec<String> = table
            .iter()
            .filter(|i| graph.is_root(i.id().base()))
            .map(|i| i.name().to_string())
            .collect();
        for name in roots {
            if let Some(instance) = table.get_mut(&name) {
                instance.set_status(FunctionStatus::Invoked)?;
            }
        }

        Ok(Self {
            graph,
            table,
            previous,
            last_change: now,
            shutdown_requested: false,
            monitoring_complete: false,
        })
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn table(&self) -> &InstanceTable {
        &self.table
    }

    pub fn status_of(&self, instance: &str) -> Option<FunctionStatus> {
        self.table.get(instance).map(|i| i.status())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::new(statuses_of(&self.table))
    }

    pub fn is_complete(&self) -> bool {
        self.monitoring_complete
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    /// Instances whose progress has to be read from the store this tick.
    pub fn probe_targets(&self) -> Vec<InstanceId> {
        if self.monitoring_complete {
            return Vec::new();
        }
        self.table
            .iter()
            .filter(|i| {
                matches!(
                    i.status(),
                    FunctionStatus::Invoked | FunctionStatus::Running
                )
            })
            .map(|i| i.id().clone())
            .collect()
    }

    /// Time since the last committed change, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_change)
    }

    /// Restart the inactivity timer, e.g. when the loop actually starts.
    pub fn reset_timer(&mut self, now: Instant) {
        self.last_change = now;
    }

    pub fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.idle_for(now) >= timeout
    }

    /// Run one reconciliation tick. Observations for instances that are no
    /// longer invoked or running are ignored.
    pub fn tick(
        &mut self,
        observations: Vec<(String, Observation)>,
        now: Instant,
    ) -> Result<TickReport> {
        if self.monitoring_complete {
            return Ok(TickReport::idle());
        }

        self.apply_observations(observations)?;
        self.resolve_pending()?;

        let failed = self.table.iter().any(|i| i.status() == FunctionStatus::Failed);
        if failed {
            self.force_unfinished(FunctionStatus::Skipped)?;
        }

        let changes = self.diff();
        if !changes.is_empty() {
            self.last_change = now;
        }

        let outcome = if failed {
            TickOutcome::Failed
        } else if self.table.iter().all(|i| i.status().is_success()) {
            TickOutcome::AllCompleted
        } else {
            TickOutcome::Continue
        };

        Ok(TickReport { changes, outcome })
    }

    /// Mark every unfinished instance SKIPPED (shutdown requested) or
    /// TIMEOUT (anything else), then latch completion. A no-op once latched.
    pub fn finalize(&mut self) -> Result<Vec<StatusChange>> {
        if self.monitoring_complete {
            return Ok(Vec::new());
        }

        let status = if self.shutdown_requested {
            FunctionStatus::Skipped
        } else {
            FunctionStatus::Timeout
        };
        self.force_unfinished(status)?;

        let changes = self.diff();
        self.monitoring_complete = true;
        Ok(changes)
    }

    /// Latch completion without touching any status.
    pub fn latch_complete(&mut self) {
        self.monitoring_complete = true;
    }

    fn apply_observations(&mut self, observations: Vec<(String, Observation)>) -> Result<()> {
        for (name, observation) in observations {
            let Some(instance) = self.table.get_mut(&name) else {
                continue;
            };
            let current = instance.status();
            if !matches!(current, FunctionStatus::Invoked | FunctionStatus::Running) {
                continue;
            }

            match observation {
                Observation::NotStarted => {}
                Observation::Running => {
                    if current == FunctionStatus::Invoked {
                        instance.set_status(FunctionStatus::Running)?;
                    }
                }
                Observation::Completed(children) => {
                    debug!(instance = %name, invoked = ?children, "instance completed");
                    instance.complete(children)?;
                }
                Observation::Failed => {
                    instance.set_status(FunctionStatus::Failed)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_pending(&mut self) -> Result<()> {
        let decisions: Vec<(String, FunctionStatus)> = {
            let resolver = InvocationResolver::new(&self.graph, &self.table);
            self.table
                .iter()
                .filter(|i| i.status() == FunctionStatus::Pending)
                .filter_map(|i| {
                    resolver
                        .resolve(i)
                        .decided_status()
                        .map(|s| (i.name().to_string(), s))
                })
                .collect()
        };

        for (name, status) in decisions {
            let Some(instance) = self.table.get_mut(&name) else {
                continue;
            };
            if status == FunctionStatus::NotInvoked {
                instance.mark_not_invoked()?;
            } else {
                instance.set_status(status)?;
            }
        }
        Ok(())
    }

    fn force_unfinished(&mut self, status: FunctionStatus) -> Result<()> {
        for instance in self.table.iter_mut() {
            if !instance.status().is_final() {
                instance.set_status(status)?;
            }
        }
        Ok(())
    }

    /// Changes since the previous diff, in table order. Updates the
    /// previous snapshot.
    fn diff(&mut self) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        for instance in self.table.iter() {
            let to = instance.status();
            let from = self
                .previous
                .insert(instance.name().to_string(), to)
                .unwrap_or(FunctionStatus::Pending);
            if from != to {
                changes.push(StatusChange {
                    instance: instance.name().to_string(),
                    from,
                    to,
                });
            }
        }
        changes
    }
}

fn statuses_of(table: &InstanceTable) -> BTreeMap<String, FunctionStatus> {
    table
        .iter()
        .map(|i| (i.name().to_string(), i.status()))
        .collect()
}
