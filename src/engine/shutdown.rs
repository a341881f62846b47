// src/engine/shutdown.rs

//! Stopping a run.
//!
//! Two flags live next to the status table: `shutdown_requested`, which the
//! monitor loop checks at the top of every tick, and `monitoring_complete`,
//! which is latched once statuses are final. A graceful shutdown sets the
//! first and waits for the loop to latch the second; a forced shutdown
//! latches it directly.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::StatusChange;
use crate::engine::runtime::WorkflowMonitor;
use crate::errors::Result;

/// How [`handle_interrupts`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The first interrupt led to a graceful shutdown; carries whether the
    /// loop stopped within the join timeout.
    GracefulShutdown(bool),
    /// A second interrupt arrived before the graceful shutdown finished.
    /// The host should terminate immediately.
    Escalate,
}

impl WorkflowMonitor {
    /// Request a graceful shutdown and wait up to `timeout` (the configured
    /// shutdown timeout when `None`) for the monitor loop to finish.
    ///
    /// Unfinished instances end up SKIPPED. Returns whether the loop actually
    /// stopped in time.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.inner.options.shutdown_timeout);

        if !self.inner.is_started() {
            // Nothing to join; settle the table right here.
            let finalized = {
                let mut core = self.inner.lock_core();
                core.request_shutdown();
                core.finalize()
            };
            self.publish_or_latch(finalized);
            return true;
        }

        self.inner.lock_core().request_shutdown();
        self.inner.wake.notify_one();

        let Some(mut handle) = self.inner.take_handle() else {
            // Another caller is joining the loop; wait for it to latch.
            debug!("workflow monitor already being joined; waiting for completion");
            return self.inner.wait_complete_within(timeout).await;
        };

        info!(
            timeout_secs = timeout.as_secs_f64(),
            "shutdown requested; waiting for workflow monitor"
        );

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                debug!("workflow monitor stopped");
                true
            }
            Ok(Ok(Err(err))) => {
                error!(error = %err, "workflow monitor ended with an error");
                true
            }
            Ok(Err(join_err)) => {
                error!(error = %join_err, "workflow monitor task did not finish cleanly");
                self.inner.lock_core().latch_complete();
                self.inner.signal_complete();
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "workflow monitor did not stop in time"
                );
                self.inner.put_handle(handle);
                false
            }
        }
    }

    /// Mark monitoring complete without waiting for the loop.
    ///
    /// Unfinished instances are set SKIPPED under the status lock; the loop
    /// sees the latched flag at its next iteration and exits without touching
    /// the table again.
    pub fn force_shutdown(&self) {
        let finalized = {
            let mut core = self.inner.lock_core();
            core.request_shutdown();
            core.finalize()
        };
        self.publish_or_latch(finalized);
        self.inner.wake.notify_one();
        self.inner.stop_log_monitors();
        warn!("workflow monitor force-stopped");
    }

    /// Graceful shutdown, then a forced one if the loop did not stop in
    /// time; afterwards every log monitor is stopped and joined (or aborted
    /// after the shutdown timeout).
    ///
    /// Returns whether the graceful path succeeded.
    pub async fn cleanup(&self) -> bool {
        let graceful = self.shutdown(None).await;
        if !graceful {
            self.force_shutdown();
            if let Some(handle) = self.inner.take_handle() {
                handle.abort();
            }
        }

        let timeout = self.inner.options.shutdown_timeout;
        for monitor in self.inner.log_monitor_list() {
            if !monitor.shutdown(timeout).await {
                warn!(instance = %monitor.instance(), "log monitor aborted during cleanup");
            }
        }

        debug!(graceful, "workflow monitor cleaned up");
        graceful
    }

    fn publish_or_latch(&self, finalized: Result<Vec<StatusChange>>) {
        match finalized {
            Ok(changes) => self.inner.publish(&changes),
            Err(err) => {
                error!(error = %err, "failed to finalize statuses");
                self.inner.lock_core().latch_complete();
            }
        }
        self.inner.signal_complete();
    }
}

/// Process-boundary interrupt handling.
///
/// Waits for the first interrupt from `next_interrupt` and starts a graceful
/// shutdown. A second interrupt before that shutdown finishes forces the
/// monitor to stop and returns [`InterruptOutcome::Escalate`]; the host is
/// expected to exit right after.
pub async fn handle_interrupts<F, Fut>(monitor: WorkflowMonitor, mut next_interrupt: F) -> InterruptOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    next_interrupt().await;
    info!("interrupt received; shutting down (interrupt again to exit immediately)");

    let shutdown = monitor.shutdown(None);
    tokio::pin!(shutdown);

    tokio::select! {
        stopped = &mut shutdown => InterruptOutcome::GracefulShutdown(stopped),
        _ = next_interrupt() => {
            warn!("second interrupt received; stopping immediately");
            monitor.force_shutdown();
            InterruptOutcome::Escalate
        }
    }
}
