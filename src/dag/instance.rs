// src/dag/instance.rs

//! Function instances and their status table.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{DagpollError, Result};
use crate::types::FunctionStatus;

static RANKED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+)\((?P<rank>[1-9][0-9]*)\)$").expect("ranked name pattern is valid")
});

/// Identity of one execution unit: a base function name plus, for functions
/// with more than one rank, a 1-based rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    base: String,
    rank: Option<u32>,
}

impl InstanceId {
    pub fn single(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            rank: None,
        }
    }

    pub fn ranked(base: impl Into<String>, rank: u32) -> Self {
        Self {
            base: base.into(),
            rank: Some(rank),
        }
    }

    /// Expand a function into its instances: one unranked instance when
    /// `rank_count <= 1`, otherwise `base(1)..=base(rank_count)`.
    pub fn expand(base: &str, rank_count: u32) -> Vec<InstanceId> {
        if rank_count <= 1 {
            vec![InstanceId::single(base)]
        } else {
            (1..=rank_count)
                .map(|rank| InstanceId::ranked(base, rank))
                .collect()
        }
    }

    /// Parse an instance name such as `"test-rank(3)"` or `"sync1"`.
    pub fn parse(name: &str) -> Self {
        match RANKED_NAME.captures(name) {
            Some(caps) => match caps["rank"].parse::<u32>() {
                Ok(rank) => InstanceId::ranked(&caps["base"], rank),
                Err(_) => InstanceId::single(name),
            },
            None => InstanceId::single(name),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    /// The instance name used in status maps and store keys.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rank {
            Some(rank) => write!(f, "{}({rank})", self.base),
            None => f.write_str(&self.base),
        }
    }
}

/// One function instance: identity plus the status the workflow monitor has
/// committed for it.
#[derive(Debug, Clone)]
pub struct FunctionInstance {
    id: InstanceId,
    name: String,
    status: FunctionStatus,
    /// Base names of the functions this instance invoked. Known only once
    /// the instance has been observed complete.
    invoked_children: Option<BTreeSet<String>>,
}

impl FunctionInstance {
    pub fn new(id: InstanceId) -> Self {
        let name = id.name();
        Self {
            id,
            name,
            status: FunctionStatus::Pending,
            invoked_children: None,
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> FunctionStatus {
        self.status
    }

    /// What this instance invoked, or `None` while it has not completed.
    pub fn invoked_children(&self) -> Option<&BTreeSet<String>> {
        self.invoked_children.as_ref()
    }

    /// Move to `next`, returning whether the status actually changed.
    ///
    /// Overwriting a final status, or moving backwards, is an
    /// [`DagpollError::IllegalTransition`].
    pub fn set_status(&mut self, next: FunctionStatus) -> Result<bool> {
        if !self.status.can_transition_to(next) {
            return Err(DagpollError::IllegalTransition {
                instance: self.name.clone(),
                from: self.status,
                to: next,
            });
        }
        let changed = self.status != next;
        self.status = next;
        Ok(changed)
    }

    /// Mark the instance completed together with what it invoked.
    pub fn complete(&mut self, invoked: BTreeSet<String>) -> Result<bool> {
        let changed = self.set_status(FunctionStatus::Completed)?;
        self.invoked_children = Some(invoked);
        Ok(changed)
    }

    /// Mark the instance not invoked. It never ran, so it invoked nothing,
    /// which lets its own dependents resolve.
    pub fn mark_not_invoked(&mut self) -> Result<bool> {
        let changed = self.set_status(FunctionStatus::NotInvoked)?;
        self.invoked_children = Some(BTreeSet::new());
        Ok(changed)
    }
}

/// All instances of a run, in declaration then rank order, addressable by
/// instance name.
#[derive(Debug, Clone, Default)]
pub struct InstanceTable {
    instances: Vec<FunctionInstance>,
    index: HashMap<String, usize>,
}

impl InstanceTable {
    pub fn new(ids: impl IntoIterator<Item = InstanceId>) -> Self {
        let mut table = Self::default();
        for id in ids {
            let instance = FunctionInstance::new(id);
            table
                .index
                .insert(instance.name().to_string(), table.instances.len());
            table.instances.push(instance);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInstance> {
        self.index.get(name).map(|&i| &self.instances[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FunctionInstance> {
        self.index.get(name).map(|&i| &mut self.instances[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionInstance> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FunctionInstance> {
        self.instances.iter_mut()
    }
}
