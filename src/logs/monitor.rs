// src/logs/monitor.rs

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::logs::{LogCallback, LogEvent, split_lines};
use crate::store::{ObjectStore, StoreError, log_key};

/// Buffered log state of one instance.
#[derive(Debug, Default)]
struct LogState {
    /// Append-only, in artifact order.
    lines: Vec<String>,
    /// The artifact has been observed in the store.
    started: bool,
    /// Stop was requested and a later poll found no new lines.
    complete: bool,
    stop_requested: bool,
}

/// Background poller for one instance's log artifact.
///
/// The buffer and flags are guarded by one lock that is never held across a
/// store call: each cycle copies what it needs, unlocks, talks to the store,
/// then relocks to append.
pub struct FunctionLogMonitor {
    instance: String,
    key: String,
    store: Arc<dyn ObjectStore>,
    stream_logs: bool,
    poll_interval: Duration,
    state: Mutex<LogState>,
    callbacks: Mutex<Vec<Arc<LogCallback>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FunctionLogMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionLogMonitor")
            .field("instance", &self.instance)
            .field("key", &self.key)
            .field("stream_logs", &self.stream_logs)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl FunctionLogMonitor {
    pub fn new(
        instance: impl Into<String>,
        invocation_folder: &str,
        store: Arc<dyn ObjectStore>,
        stream_logs: bool,
        poll_interval: Duration,
    ) -> Self {
        let instance = instance.into();
        let key = log_key(invocation_folder, &instance);
        Self {
            instance,
            key,
            store,
            stream_logs,
            poll_interval,
            state: Mutex::new(LogState::default()),
            callbacks: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Store key of the log artifact.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    pub fn content(&self) -> String {
        self.state().lines.join("\n")
    }

    pub fn is_started(&self) -> bool {
        self.state().started
    }

    pub fn is_complete(&self) -> bool {
        self.state().complete
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state().stop_requested
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(LogEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Ask the monitor to finish. It reports `Complete` after the next poll
    /// that finds no new lines.
    pub fn stop(&self) {
        self.state().stop_requested = true;
    }

    /// Spawn the background poll loop. Returns `false` if it was already
    /// started.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return false;
        }

        let monitor = Arc::clone(self);
        let span = info_span!("function_log", instance = %self.instance);
        *handle = Some(tokio::spawn(monitor.run().instrument(span)));
        true
    }

    /// Stop the monitor and wait up to `timeout` for it to report
    /// completion; abort the poll task if it does not. A monitor whose
    /// artifact never appeared is aborted immediately.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return true;
        };

        if !self.is_started() {
            handle.abort();
            debug!(instance = %self.instance, "log never appeared; poll task aborted");
            return true;
        }

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    instance = %self.instance,
                    timeout_secs = timeout.as_secs_f64(),
                    "log monitor did not complete in time; aborting"
                );
                handle.abort();
                false
            }
        }
    }

    async fn run(self: Arc<Self>) {
        debug!(key = %self.key, "log monitor started");

        while !self.is_complete() {
            if let Err(err) = self.poll_once().await {
                warn!(
                    key = %self.key,
                    error = %err,
                    "store error while polling log; retrying"
                );
            }

            if self.is_complete() {
                break;
            }
            sleep(self.poll_interval).await;
        }

        debug!(key = %self.key, "log monitor finished");
    }

    /// Run exactly one poll cycle and return the event it fired, if any.
    ///
    /// Store errors are returned to the caller; the buffer is left as it was.
    pub async fn poll_once(&self) -> Result<Option<LogEvent>, StoreError> {
        let (started, stop_requested) = {
            let state = self.state();
            if state.complete {
                return Ok(None);
            }
            (state.started, state.stop_requested)
        };

        if !started {
            if !self.store.exists(&self.key).await? {
                return Ok(None);
            }
            self.state().started = true;
            self.dispatch(LogEvent::Created);
            return Ok(Some(LogEvent::Created));
        }

        let content = self.store.get_string(&self.key).await?;
        let all_lines = split_lines(&content);

        let new_lines: Vec<String> = {
            let mut state = self.state();
            let already = state.lines.len().min(all_lines.len());
            let new_lines = all_lines[already..].to_vec();
            state.lines.extend(new_lines.iter().cloned());
            if stop_requested && new_lines.is_empty() {
                state.complete = true;
            }
            new_lines
        };

        if !new_lines.is_empty() {
            if self.stream_logs {
                for line in &new_lines {
                    info!(target: "dagpoll::function_log", instance = %self.instance, "{line}");
                }
            }
            self.dispatch(LogEvent::Updated);
            return Ok(Some(LogEvent::Updated));
        }

        if stop_requested {
            self.dispatch(LogEvent::Complete);
            return Ok(Some(LogEvent::Complete));
        }

        Ok(None)
    }

    fn dispatch(&self, event: LogEvent) {
        // Copy out so callbacks may use this monitor without deadlocking.
        let callbacks: Vec<Arc<LogCallback>> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(
                    instance = %self.instance,
                    callback = index,
                    %event,
                    error = %err,
                    "error in log callback"
                ),
                Err(_) => error!(
                    instance = %self.instance,
                    callback = index,
                    %event,
                    "log callback panicked"
                ),
            }
        }
    }
}
