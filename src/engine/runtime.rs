// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::WorkflowFile;
use crate::dag::WorkflowGraph;
use crate::engine::core::MonitorCore;
use crate::engine::probe::{InvocationProbe, StoreProbe};
use crate::engine::snapshot::StatusSnapshot;
use crate::engine::{ExitReason, MonitorOptions, StatusChange, TickOutcome};
use crate::errors::{DagpollError, Result};
use crate::logs::{FunctionLogMonitor, LogEvent};
use crate::store::{DirectoryStore, ObjectStore};
use crate::types::FunctionStatus;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Shared state of one run. Everything the loop and the public handle both
/// touch lives here.
pub(crate) struct MonitorInner {
    workflow_name: String,
    invocation_id: String,
    invocation_folder: String,
    instances: Vec<String>,
    pub(crate) options: MonitorOptions,
    /// Status table and both flags, behind one lock.
    core: Mutex<MonitorCore>,
    probe: Arc<dyn InvocationProbe>,
    store: Arc<dyn ObjectStore>,
    log_monitors: Mutex<BTreeMap<String, Arc<FunctionLogMonitor>>>,
    /// Cuts the check-interval sleep short on shutdown.
    pub(crate) wake: Notify,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    started: AtomicBool,
    changes: broadcast::Sender<StatusChange>,
    /// Flips to `true` once completion is latched and the final changes
    /// were published.
    completed: watch::Sender<bool>,
}

impl MonitorInner {
    pub(crate) fn lock_core(&self) -> MutexGuard<'_, MonitorCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_log_monitors(&self) -> MutexGuard<'_, BTreeMap<String, Arc<FunctionLogMonitor>>> {
        self.log_monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_handle(&self) -> Option<JoinHandle<Result<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn put_handle(&self, handle: JoinHandle<Result<()>>) {
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn signal_complete(&self) {
        self.completed.send_replace(true);
    }

    /// Wait until completion is signalled, at most `timeout`. Returns
    /// whether it was.
    pub(crate) async fn wait_complete_within(&self, timeout: std::time::Duration) -> bool {
        let mut rx = self.completed.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|done| *done))
            .await
            .is_ok_and(|signalled| signalled.is_ok())
    }

    /// Log and broadcast committed changes; stop the log monitors of
    /// instances that just became final.
    pub(crate) fn publish(&self, changes: &[StatusChange]) {
        for change in changes {
            match change.to {
                FunctionStatus::Failed | FunctionStatus::Timeout => warn!(
                    instance = %change.instance,
                    from = %change.from,
                    to = %change.to,
                    "status changed"
                ),
                _ => info!(
                    instance = %change.instance,
                    from = %change.from,
                    to = %change.to,
                    "status changed"
                ),
            }

            // No subscribers is fine.
            let _ = self.changes.send(change.clone());

            if change.to.is_final() {
                if let Some(monitor) = self.lock_log_monitors().get(&change.instance) {
                    monitor.stop();
                }
            }
        }
    }

    pub(crate) fn stop_log_monitors(&self) {
        for monitor in self.lock_log_monitors().values() {
            monitor.stop();
        }
    }

    pub(crate) fn log_monitor_list(&self) -> Vec<Arc<FunctionLogMonitor>> {
        self.lock_log_monitors().values().cloned().collect()
    }

    fn log_monitor_for(&self, instance: &str) -> Arc<FunctionLogMonitor> {
        let mut monitors = self.lock_log_monitors();
        let monitor = monitors.entry(instance.to_string()).or_insert_with(|| {
            Arc::new(FunctionLogMonitor::new(
                instance,
                &self.invocation_folder,
                Arc::clone(&self.store),
                self.options.stream_logs,
                self.options.log_poll_interval,
            ))
        });
        Arc::clone(monitor)
    }
}

/// Observes one workflow invocation.
///
/// Cloning yields another handle to the same run. The reconciliation loop
/// and the log monitors are spawned onto the current tokio runtime by
/// [`WorkflowMonitor::start`]; readers take snapshots of the status table at
/// any time.
#[derive(Clone)]
pub struct WorkflowMonitor {
    pub(crate) inner: Arc<MonitorInner>,
}

impl fmt::Debug for WorkflowMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowMonitor")
            .field("workflow_name", &self.inner.workflow_name)
            .field("invocation_id", &self.inner.invocation_id)
            .field("invocation_folder", &self.inner.invocation_folder)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkflowMonitor`].
#[derive(Debug)]
pub struct WorkflowMonitorBuilder {
    graph: WorkflowGraph,
    store: Arc<dyn ObjectStore>,
    workflow_name: Option<String>,
    invocation_id: Option<String>,
    invocation_folder: Option<String>,
    options: MonitorOptions,
    probe: Option<Arc<dyn InvocationProbe>>,
}

impl WorkflowMonitorBuilder {
    pub fn workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn invocation_id(mut self, id: impl Into<String>) -> Self {
        self.invocation_id = Some(id.into());
        self
    }

    /// Store folder holding the run's artifacts. Defaults to
    /// `<workflow_name>/<invocation_id>`.
    pub fn invocation_folder(mut self, folder: impl Into<String>) -> Self {
        self.invocation_folder = Some(folder.into());
        self
    }

    pub fn options(mut self, options: MonitorOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the default [`StoreProbe`].
    pub fn probe(mut self, probe: Arc<dyn InvocationProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<WorkflowMonitor> {
        self.options.validate()?;

        let workflow_name = self
            .workflow_name
            .unwrap_or_else(|| self.graph.entrypoint().to_string());
        let invocation_id = self.invocation_id.unwrap_or_default();

        let invocation_folder = match self.invocation_folder {
            Some(folder) => folder,
            None if !invocation_id.trim().is_empty() => {
                format!("{workflow_name}/{invocation_id}")
            }
            None => {
                return Err(DagpollError::Initialization(
                    "missing invocation id: set an invocation id or an invocation folder"
                        .to_string(),
                ));
            }
        };

        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(StoreProbe::new(
                Arc::clone(&self.store),
                invocation_folder.clone(),
            ))
        });

        let instances: Vec<String> = self
            .graph
            .instances()
            .iter()
            .map(|id| id.name())
            .collect();
        let core = MonitorCore::new(self.graph, Instant::now())?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (completed, _) = watch::channel(false);

        Ok(WorkflowMonitor {
            inner: Arc::new(MonitorInner {
                workflow_name,
                invocation_id,
                invocation_folder,
                instances,
                options: self.options,
                core: Mutex::new(core),
                probe,
                store: self.store,
                log_monitors: Mutex::new(BTreeMap::new()),
                wake: Notify::new(),
                handle: Mutex::new(None),
                started: AtomicBool::new(false),
                changes,
                completed,
            }),
        })
    }
}

impl WorkflowMonitor {
    pub fn builder(graph: WorkflowGraph, store: Arc<dyn ObjectStore>) -> WorkflowMonitorBuilder {
        WorkflowMonitorBuilder {
            graph,
            store,
            workflow_name: None,
            invocation_id: None,
            invocation_folder: None,
            options: MonitorOptions::default(),
            probe: None,
        }
    }

    /// Build a monitor for a validated workflow file, reading artifacts
    /// from a [`DirectoryStore`] at the configured store root.
    pub fn from_config(cfg: &WorkflowFile) -> Result<Self> {
        let graph = WorkflowGraph::from_config(cfg)?;
        let store: Arc<dyn ObjectStore> = Arc::new(DirectoryStore::new(&cfg.store_root));

        Self::builder(graph, store)
            .workflow_name(&cfg.workflow.name)
            .invocation_id(&cfg.invocation_id)
            .invocation_folder(&cfg.invocation_folder)
            .options(cfg.monitor.options())
            .build()
    }

    /// Spawn the reconciliation loop and any requested log monitors.
    ///
    /// Must be called from within a tokio runtime. A second call fails with
    /// [`DagpollError::AlreadyStarted`].
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(DagpollError::AlreadyStarted);
        }

        self.inner.lock_core().reset_timer(Instant::now());

        if self.inner.options.stream_logs {
            for name in &self.inner.instances {
                self.inner.log_monitor_for(name);
            }
        }
        for monitor in self.inner.log_monitor_list() {
            monitor.start();
        }

        let span = info_span!(
            "workflow",
            workflow = %self.inner.workflow_name,
            invocation_id = %self.inner.invocation_id,
        );
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner)).instrument(span));
        self.inner.put_handle(handle);

        Ok(())
    }

    pub fn workflow_name(&self) -> &str {
        &self.inner.workflow_name
    }

    pub fn invocation_id(&self) -> &str {
        &self.inner.invocation_id
    }

    pub fn invocation_folder(&self) -> &str {
        &self.inner.invocation_folder
    }

    /// Instance names in declaration then rank order.
    pub fn instances(&self) -> &[String] {
        &self.inner.instances
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.inner.options
    }

    /// Thread-safe copy of the current statuses.
    pub fn get_statuses(&self) -> StatusSnapshot {
        self.inner.lock_core().snapshot()
    }

    pub fn status_of(&self, instance: &str) -> Option<FunctionStatus> {
        self.inner.lock_core().status_of(instance)
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock_core().is_complete()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.lock_core().is_shutdown_requested()
    }

    /// Feed of committed status changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.changes.subscribe()
    }

    /// Register a log event callback for `instance`, creating its log
    /// monitor if needed. Once the run has started the monitor starts
    /// immediately.
    pub fn register_log_callback<F>(&self, instance: &str, callback: F) -> Result<()>
    where
        F: Fn(LogEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let status = self
            .status_of(instance)
            .ok_or_else(|| DagpollError::UnknownFunction(instance.to_string()))?;

        let monitor = self.inner.log_monitor_for(instance);
        monitor.register_callback(callback);

        if self.inner.is_started() {
            monitor.start();
            if status.is_final() || self.is_complete() {
                monitor.stop();
            }
        }
        Ok(())
    }

    pub fn log_monitor(&self, instance: &str) -> Option<Arc<FunctionLogMonitor>> {
        self.inner.lock_log_monitors().get(instance).cloned()
    }

    /// Buffered log lines of `instance`, if it has a log monitor.
    pub fn log_lines(&self, instance: &str) -> Option<Vec<String>> {
        self.log_monitor(instance).map(|m| m.lines())
    }

    /// Wait until `instance` reaches a final status and return it.
    ///
    /// Polls the snapshot once per check interval. If the run ends before
    /// the instance became final, its last status is returned.
    pub async fn wait_for(&self, instance: &str) -> Result<FunctionStatus> {
        loop {
            let (status, complete) = {
                let core = self.inner.lock_core();
                (core.status_of(instance), core.is_complete())
            };
            let status = status.ok_or_else(|| DagpollError::UnknownFunction(instance.to_string()))?;
            if status.is_final() || complete {
                return Ok(status);
            }
            sleep(self.inner.options.check_interval).await;
        }
    }

    /// Wait until monitoring is complete and return the final statuses.
    ///
    /// Every change of the run has been published to [`subscribe`] receivers
    /// by the time this returns.
    ///
    /// [`subscribe`]: WorkflowMonitor::subscribe
    pub async fn wait_until_complete(&self) -> StatusSnapshot {
        let mut rx = self.inner.completed.subscribe();
        // The sender lives in `inner`, so this only ends on `true`.
        let _ = rx.wait_for(|done| *done).await;
        self.get_statuses()
    }
}

async fn run_loop(inner: Arc<MonitorInner>) -> Result<()> {
    info!(
        instances = inner.instances.len(),
        folder = %inner.invocation_folder,
        "workflow monitor started"
    );

    let reason = match monitor_loop(&inner).await {
        Ok(reason) => reason,
        Err(err) => {
            error!(error = %err, "workflow monitor stopped on a fatal error");
            inner.lock_core().latch_complete();
            inner.signal_complete();
            inner.stop_log_monitors();
            return Err(err);
        }
    };

    let finalized = inner.lock_core().finalize();
    let result = match finalized {
        Ok(changes) => {
            inner.publish(&changes);
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "failed to finalize statuses");
            inner.lock_core().latch_complete();
            Err(err)
        }
    };
    inner.signal_complete();
    inner.stop_log_monitors();

    info!(?reason, "workflow monitor finished");
    result
}

async fn monitor_loop(inner: &MonitorInner) -> Result<ExitReason> {
    let options = inner.options;

    loop {
        let targets = {
            let core = inner.lock_core();
            if core.is_complete() || core.is_shutdown_requested() {
                debug!("shutdown requested; leaving monitor loop");
                return Ok(ExitReason::ShutdownRequested);
            }
            core.probe_targets()
        };

        let mut observations = Vec::with_capacity(targets.len());
        for id in &targets {
            match inner.probe.observe(id).await {
                Ok(observation) => observations.push((id.name(), observation)),
                Err(err) => warn!(
                    instance = %id,
                    error = %err,
                    "store error while probing instance; retrying next tick"
                ),
            }
        }

        let (report, timed_out) = {
            let mut core = inner.lock_core();
            let now = Instant::now();
            let report = core.tick(observations, now)?;
            (report, core.timed_out(now, options.timeout))
        };
        inner.publish(&report.changes);

        match report.outcome {
            TickOutcome::AllCompleted => {
                info!("all functions completed");
                return Ok(ExitReason::AllCompleted);
            }
            TickOutcome::Failed => {
                warn!("a function failed; remaining functions skipped");
                return Ok(ExitReason::Failed);
            }
            TickOutcome::Continue => {}
        }

        if timed_out {
            warn!(
                timeout_secs = options.timeout.as_secs_f64(),
                "no status change within the inactivity timeout"
            );
            return Ok(ExitReason::TimedOut);
        }

        tokio::select! {
            _ = sleep(options.check_interval) => {}
            _ = inner.wake.notified() => {
                debug!("monitor loop woken early");
            }
        }
    }
}
