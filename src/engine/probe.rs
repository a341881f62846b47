// src/engine/probe.rs

//! Observing an instance's progress from the artifacts it leaves in the
//! store.
//!
//! The monitor asks an [`InvocationProbe`] about every invoked or running
//! instance on each tick. Production code uses [`StoreProbe`]; tests can
//! plug in their own probe through the monitor builder.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::dag::InstanceId;
use crate::store::{ObjectStore, StoreError, done_key, failed_key, log_key};

/// What the store currently says about one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// No artifact written yet.
    NotStarted,
    /// The log artifact exists but the instance has not finished.
    Running,
    /// Finished successfully; carries the base names it invoked.
    Completed(BTreeSet<String>),
    Failed,
}

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<Observation, StoreError>> + Send + 'a>>;

pub trait InvocationProbe: Send + Sync + Debug {
    fn observe<'a>(&'a self, instance: &'a InstanceId) -> ProbeFuture<'a>;
}

/// Completion manifest written by the execution side when an instance
/// finishes:
///
/// ```json
/// {"invoked": ["test-py-api", "test-r-api"]}
/// ```
///
/// An empty object body means the instance invoked nothing.
#[derive(Debug, Deserialize)]
struct CompletionManifest {
    #[serde(default)]
    invoked: Vec<String>,
}

/// Parse a completion manifest body into the set of invoked base names.
pub fn parse_manifest(key: &str, body: &str) -> Result<BTreeSet<String>, StoreError> {
    if body.trim().is_empty() {
        return Ok(BTreeSet::new());
    }

    let manifest: CompletionManifest =
        serde_json::from_str(body).map_err(|e| StoreError::Manifest {
            key: key.to_string(),
            message: e.to_string(),
        })?;

    Ok(manifest.invoked.into_iter().collect())
}

/// Probe that reads the failure marker, the completion manifest and the log
/// artifact of an instance, in that order.
#[derive(Debug, Clone)]
pub struct StoreProbe {
    store: Arc<dyn ObjectStore>,
    invocation_folder: String,
}

impl StoreProbe {
    pub fn new(store: Arc<dyn ObjectStore>, invocation_folder: impl Into<String>) -> Self {
        Self {
            store,
            invocation_folder: invocation_folder.into(),
        }
    }
}

impl InvocationProbe for StoreProbe {
    fn observe<'a>(&'a self, instance: &'a InstanceId) -> ProbeFuture<'a> {
        Box::pin(async move {
            let name = instance.name();

            let failed = failed_key(&self.invocation_folder, &name);
            if self.store.exists(&failed).await? {
                return Ok(Observation::Failed);
            }

            let done = done_key(&self.invocation_folder, &name);
            match self.store.get_string(&done).await {
                Ok(body) => return parse_manifest(&done, &body).map(Observation::Completed),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }

            let log = log_key(&self.invocation_folder, &name);
            if self.store.exists(&log).await? {
                Ok(Observation::Running)
            } else {
                Ok(Observation::NotStarted)
            }
        })
    }
}
