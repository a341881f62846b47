// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::MonitorOptions;

/// Environment variable that supplies the invocation id when the file does
/// not.
pub const INVOCATION_ID_ENV: &str = "DAGPOLL_INVOCATION_ID";

/// Environment variable that overrides `[store].root`.
pub const STORE_ROOT_ENV: &str = "DAGPOLL_STORE_ROOT";

/// Workflow description as read from a TOML file, before validation.
///
/// ```toml
/// [workflow]
/// name = "IntegrationTestWorkflow"
/// entrypoint = "create-input"
/// invocation_id = "6f1c0e1a"
///
/// [monitor]
/// timeout_secs = 180
/// stream_logs = true
///
/// [store]
/// root = "/mnt/bucket"
///
/// [function.create-input]
/// invoke = ["test-rank"]
///
/// [function.test-rank]
/// rank = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    pub workflow: WorkflowSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub store: StoreSection,

    /// All functions from `[function.<name>]`.
    #[serde(default)]
    pub function: BTreeMap<String, FunctionConfig>,
}

impl RawWorkflowFile {
    /// Fill in values that may come from the environment.
    ///
    /// The store root from the environment wins over the file; the
    /// invocation id from the environment is only used when the file has
    /// none.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(STORE_ROOT_ENV).filter(|s| !s.trim().is_empty()) {
            self.store.root = Some(PathBuf::from(root));
        }
        if self.workflow.invocation_id.is_none() {
            self.workflow.invocation_id =
                lookup(INVOCATION_ID_ENV).filter(|s| !s.trim().is_empty());
        }
    }
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    pub name: String,

    /// The function the workflow was started from.
    pub entrypoint: String,

    #[serde(default)]
    pub invocation_id: Option<String>,

    /// Store folder holding this invocation's artifacts. Defaults to
    /// `<name>/<invocation_id>`.
    #[serde(default)]
    pub invocation_folder: Option<String>,
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Seconds without any status change before the run times out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub stream_logs: bool,

    #[serde(default = "default_log_poll_interval_secs")]
    pub log_poll_interval_secs: u64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_check_interval_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_log_poll_interval_secs() -> u64 {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            timeout_secs: default_timeout_secs(),
            stream_logs: false,
            log_poll_interval_secs: default_log_poll_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl MonitorSection {
    pub fn options(&self) -> MonitorOptions {
        MonitorOptions {
            check_interval: Duration::from_secs(self.check_interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            stream_logs: self.stream_logs,
            log_poll_interval: Duration::from_secs(self.log_poll_interval_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreSection {
    /// Root directory of the directory-backed store.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[function.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    /// Functions this one may invoke.
    #[serde(default)]
    pub invoke: Vec<String>,

    /// Number of parallel instances.
    #[serde(default = "default_rank")]
    pub rank: u32,
}

fn default_rank() -> u32 {
    1
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            invoke: Vec::new(),
            rank: default_rank(),
        }
    }
}

/// A validated workflow file. Only constructed through
/// `TryFrom<RawWorkflowFile>`.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub workflow: WorkflowSection,
    pub monitor: MonitorSection,
    pub function: BTreeMap<String, FunctionConfig>,
    pub invocation_id: String,
    pub invocation_folder: String,
    pub store_root: PathBuf,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(
        raw: RawWorkflowFile,
        invocation_id: String,
        store_root: PathBuf,
    ) -> Self {
        let invocation_folder = raw
            .workflow
            .invocation_folder
            .clone()
            .unwrap_or_else(|| format!("{}/{}", raw.workflow.name, invocation_id));

        Self {
            workflow: raw.workflow,
            monitor: raw.monitor,
            function: raw.function,
            invocation_id,
            invocation_folder,
            store_root,
        }
    }
}
