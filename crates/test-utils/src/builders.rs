#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use dagpoll::config::{
    FunctionConfig, MonitorSection, RawWorkflowFile, StoreSection, WorkflowFile, WorkflowSection,
};
use dagpoll::dag::WorkflowGraph;
use dagpoll::errors::Result;

/// Builder for `WorkflowGraph` to simplify test setup.
///
/// The first declared function is the entrypoint unless set explicitly.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    functions: Vec<(String, Vec<String>)>,
    ranks: HashMap<String, u32>,
    entrypoint: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(mut self, name: &str, invokes: &[&str]) -> Self {
        self.functions.push((
            name.to_string(),
            invokes.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn rank(mut self, name: &str, rank: u32) -> Self {
        self.ranks.insert(name.to_string(), rank);
        self
    }

    pub fn entrypoint(mut self, name: &str) -> Self {
        self.entrypoint = Some(name.to_string());
        self
    }

    pub fn try_build(self) -> Result<WorkflowGraph> {
        let entrypoint = self
            .entrypoint
            .or_else(|| self.functions.first().map(|(name, _)| name.clone()))
            .unwrap_or_default();
        WorkflowGraph::new(self.functions, &self.ranks, &entrypoint)
    }

    pub fn build(self) -> WorkflowGraph {
        self.try_build().expect("test graph should be valid")
    }
}

/// Builder for `RawWorkflowFile` / `WorkflowFile`.
pub struct WorkflowFileBuilder {
    raw: RawWorkflowFile,
}

impl WorkflowFileBuilder {
    pub fn new(name: &str, entrypoint: &str) -> Self {
        Self {
            raw: RawWorkflowFile {
                workflow: WorkflowSection {
                    name: name.to_string(),
                    entrypoint: entrypoint.to_string(),
                    invocation_id: Some("test-invocation".to_string()),
                    invocation_folder: None,
                },
                monitor: MonitorSection::default(),
                store: StoreSection {
                    root: Some(PathBuf::from("/tmp/dagpoll-test-store")),
                },
                function: BTreeMap::new(),
            },
        }
    }

    pub fn function(mut self, name: &str, invoke: &[&str]) -> Self {
        self.raw.function.insert(
            name.to_string(),
            FunctionConfig {
                invoke: invoke.iter().map(|s| s.to_string()).collect(),
                ..FunctionConfig::default()
            },
        );
        self
    }

    pub fn ranked_function(mut self, name: &str, invoke: &[&str], rank: u32) -> Self {
        self.raw.function.insert(
            name.to_string(),
            FunctionConfig {
                invoke: invoke.iter().map(|s| s.to_string()).collect(),
                rank,
            },
        );
        self
    }

    pub fn invocation_id(mut self, id: Option<&str>) -> Self {
        self.raw.workflow.invocation_id = id.map(str::to_string);
        self
    }

    pub fn store_root(mut self, root: Option<PathBuf>) -> Self {
        self.raw.store.root = root;
        self
    }

    pub fn monitor(mut self, monitor: MonitorSection) -> Self {
        self.raw.monitor = monitor;
        self
    }

    pub fn raw(self) -> RawWorkflowFile {
        self.raw
    }

    pub fn try_build(self) -> Result<WorkflowFile> {
        WorkflowFile::try_from(self.raw)
    }

    pub fn build(self) -> WorkflowFile {
        self.try_build().expect("test workflow file should be valid")
    }
}
