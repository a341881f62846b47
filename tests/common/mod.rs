#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use dagpoll::dag::WorkflowGraph;
use dagpoll::engine::{MonitorOptions, StatusChange, WorkflowMonitor};
use dagpoll::store::MemoryStore;
use dagpoll_test_utils::{FakeExecution, test_options};
use tokio::sync::broadcast;

pub const FOLDER: &str = "wf/inv-1";

/// A monitor over an in-memory store plus the fake execution side writing
/// into that store.
pub fn monitor_with(graph: WorkflowGraph, options: MonitorOptions) -> (WorkflowMonitor, FakeExecution) {
    let store = MemoryStore::new();
    let exec = FakeExecution::new(store.clone(), FOLDER);
    let monitor = WorkflowMonitor::builder(graph, Arc::new(store))
        .workflow_name("wf")
        .invocation_id("inv-1")
        .options(options)
        .build()
        .expect("monitor should build");
    (monitor, exec)
}

pub fn default_monitor(graph: WorkflowGraph) -> (WorkflowMonitor, FakeExecution) {
    monitor_with(graph, test_options())
}

pub fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Drain every change currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<StatusChange>) -> Vec<StatusChange> {
    let mut out = Vec::new();
    while let Ok(change) = rx.try_recv() {
        out.push(change);
    }
    out
}
