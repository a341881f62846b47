// src/config/validate.rs

use std::collections::HashMap;

use crate::config::model::{
    INVOCATION_ID_ENV, RawWorkflowFile, STORE_ROOT_ENV, WorkflowFile,
};
use crate::dag::WorkflowGraph;
use crate::errors::{DagpollError, Result};

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = DagpollError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let invocation_id = require_invocation_id(&raw)?;
        let store_root = raw.store.root.clone().ok_or_else(|| {
            DagpollError::Initialization(format!(
                "missing store root: set [store].root or {STORE_ROOT_ENV}"
            ))
        })?;

        Ok(WorkflowFile::new_unchecked(raw, invocation_id, store_root))
    }
}

fn validate_raw_config(cfg: &RawWorkflowFile) -> Result<()> {
    ensure_has_functions(cfg)?;
    validate_workflow_section(cfg)?;
    validate_monitor_section(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_functions(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.function.is_empty() {
        return Err(DagpollError::ConfigError(
            "config must contain at least one [function.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow_section(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.workflow.name.trim().is_empty() {
        return Err(DagpollError::ConfigError(
            "[workflow].name must not be empty".to_string(),
        ));
    }
    if cfg.workflow.entrypoint.trim().is_empty() {
        return Err(DagpollError::ConfigError(
            "[workflow].entrypoint must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_monitor_section(cfg: &RawWorkflowFile) -> Result<()> {
    let monitor = &cfg.monitor;
    let fields = [
        ("check_interval_secs", monitor.check_interval_secs),
        ("timeout_secs", monitor.timeout_secs),
        ("log_poll_interval_secs", monitor.log_poll_interval_secs),
    ];

    for (field, value) in fields {
        if value == 0 {
            return Err(DagpollError::ConfigError(format!(
                "[monitor].{field} must be >= 1 (got 0)"
            )));
        }
    }
    Ok(())
}

/// Graph-level checks (unknown targets, self-invocation, ranks, entrypoint,
/// cycles) live with the graph itself; build one to run them.
fn validate_graph(cfg: &RawWorkflowFile) -> Result<()> {
    let functions = cfg
        .function
        .iter()
        .map(|(name, f)| (name.clone(), f.invoke.clone()));
    let ranks: HashMap<String, u32> = cfg
        .function
        .iter()
        .map(|(name, f)| (name.clone(), f.rank))
        .collect();

    WorkflowGraph::new(functions, &ranks, &cfg.workflow.entrypoint)?;
    Ok(())
}

fn require_invocation_id(cfg: &RawWorkflowFile) -> Result<String> {
    match cfg.workflow.invocation_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(DagpollError::Initialization(format!(
            "missing invocation id: set [workflow].invocation_id or {INVOCATION_ID_ENV}"
        ))),
    }
}
