// src/engine/snapshot.rs

use std::collections::BTreeMap;

use crate::types::FunctionStatus;

/// Immutable copy of the status table taken under the run lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot(BTreeMap<String, FunctionStatus>);

impl StatusSnapshot {
    pub fn new(statuses: BTreeMap<String, FunctionStatus>) -> Self {
        Self(statuses)
    }

    pub fn get(&self, instance: &str) -> Option<FunctionStatus> {
        self.0.get(instance).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FunctionStatus)> {
        self.0.iter().map(|(name, status)| (name.as_str(), *status))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn all_final(&self) -> bool {
        self.0.values().all(|s| s.is_final())
    }

    /// Every instance COMPLETED or NOT_INVOKED.
    pub fn succeeded(&self) -> bool {
        self.0.values().all(|s| s.is_success())
    }

    pub fn into_inner(self) -> BTreeMap<String, FunctionStatus> {
        self.0
    }
}

impl From<BTreeMap<String, FunctionStatus>> for StatusSnapshot {
    fn from(statuses: BTreeMap<String, FunctionStatus>) -> Self {
        Self(statuses)
    }
}
