// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::WorkflowFile;
use crate::dag::instance::InstanceId;
use crate::errors::{DagpollError, Result};

/// Internal node structure: stores immediate invocations in both directions.
#[derive(Debug, Clone)]
struct FunctionNode {
    name: String,
    /// Functions this one may invoke, in declaration order.
    invokes: Vec<String>,
    /// Functions that may invoke this one, in declaration order of the
    /// invokers.
    invoked_by: Vec<String>,
    /// Number of parallel instances (always >= 1).
    rank: u32,
}

/// Static invocation graph keyed by base function name.
///
/// The reverse adjacency is derived once by inverting the forward edges, so
/// `u` is an invoker of `v` exactly when `v` is among the invocations of `u`.
/// Ranks are set at construction and never change.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: Vec<FunctionNode>,
    index: HashMap<String, usize>,
    entrypoint: String,
}

impl WorkflowGraph {
    /// Build and validate a graph.
    ///
    /// - `functions`: every function with the functions it may invoke, in
    ///   declaration order.
    /// - `ranks`: rank counts; functions not listed have rank 1.
    /// - `entrypoint`: the function the workflow is started from.
    ///
    /// Fails when an edge targets an undeclared function, a function invokes
    /// itself, a rank is zero, the entrypoint is unknown or has invokers, or
    /// the edges form a cycle.
    pub fn new<I, N, E>(functions: I, ranks: &HashMap<String, u32>, entrypoint: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (N, Vec<E>)>,
        N: Into<String>,
        E: Into<String>,
    {
        let mut nodes: Vec<FunctionNode> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        // First pass: create nodes with their (deduplicated) invocation lists.
        for (name, invokes) in functions {
            let name = name.into();
            if index.contains_key(&name) {
                return Err(DagpollError::Initialization(format!(
                    "function '{name}' is declared more than once"
                )));
            }

            let mut seen = HashSet::new();
            let invokes: Vec<String> = invokes
                .into_iter()
                .map(Into::into)
                .filter(|target: &String| seen.insert(target.clone()))
                .collect();

            index.insert(name.clone(), nodes.len());
            nodes.push(FunctionNode {
                name,
                invokes,
                invoked_by: Vec::new(),
                rank: 1,
            });
        }

        if nodes.is_empty() {
            return Err(DagpollError::Initialization(
                "invocation graph must contain at least one function".to_string(),
            ));
        }

        for (name, &rank) in ranks {
            let Some(&i) = index.get(name) else {
                return Err(DagpollError::UnknownFunction(format!(
                    "rank given for undeclared function '{name}'"
                )));
            };
            if rank == 0 {
                return Err(DagpollError::Initialization(format!(
                    "function '{name}' must have rank >= 1 (got 0)"
                )));
            }
            nodes[i].rank = rank;
        }

        // Second pass: populate invokers by inverting the forward edges.
        for i in 0..nodes.len() {
            let invoker = nodes[i].name.clone();
            let targets = nodes[i].invokes.clone();

            for target in targets {
                if target == invoker {
                    return Err(DagpollError::Initialization(format!(
                        "function '{invoker}' cannot invoke itself"
                    )));
                }
                let Some(&t) = index.get(&target) else {
                    return Err(DagpollError::UnknownFunction(format!(
                        "function '{invoker}' invokes undeclared function '{target}'"
                    )));
                };
                nodes[t].invoked_by.push(invoker.clone());
            }
        }

        let graph = Self {
            nodes,
            index,
            entrypoint: entrypoint.to_string(),
        };
        graph.validate_entrypoint()?;
        graph.validate_acyclic()?;
        Ok(graph)
    }

    /// Build a graph from a validated [`WorkflowFile`].
    pub fn from_config(cfg: &WorkflowFile) -> Result<Self> {
        let functions = cfg
            .function
            .iter()
            .map(|(name, f)| (name.clone(), f.invoke.clone()));
        let ranks: HashMap<String, u32> = cfg
            .function
            .iter()
            .map(|(name, f)| (name.clone(), f.rank))
            .collect();

        Self::new(functions, &ranks, &cfg.workflow.entrypoint)
    }

    fn validate_entrypoint(&self) -> Result<()> {
        let Some(node) = self.node(&self.entrypoint) else {
            return Err(DagpollError::UnknownFunction(format!(
                "entrypoint '{}' is not a declared function",
                self.entrypoint
            )));
        };
        if !node.invoked_by.is_empty() {
            return Err(DagpollError::Initialization(format!(
                "entrypoint '{}' is invoked by {:?}; it must have no invokers",
                self.entrypoint, node.invoked_by
            )));
        }
        Ok(())
    }

    fn validate_acyclic(&self) -> Result<()> {
        // Edge direction: invoker -> invoked.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for node in &self.nodes {
            graph.add_node(node.name.as_str());
        }
        for node in &self.nodes {
            for target in &node.invokes {
                graph.add_edge(node.name.as_str(), target.as_str(), ());
            }
        }

        // A topological sort will fail if there is a cycle.
        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(DagpollError::DagCycle(format!(
                "cycle detected in invocation graph involving function '{}'",
                cycle.node_id()
            ))),
        }
    }

    fn node(&self, name: &str) -> Option<&FunctionNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All base function names, in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Functions `name` may invoke.
    pub fn invokes(&self, name: &str) -> &[String] {
        self.node(name).map(|n| n.invokes.as_slice()).unwrap_or(&[])
    }

    /// Functions that may invoke `name`, in declaration order.
    pub fn invokers(&self, name: &str) -> &[String] {
        self.node(name)
            .map(|n| n.invoked_by.as_slice())
            .unwrap_or(&[])
    }

    /// A function nobody invokes starts out invoked.
    pub fn is_root(&self, name: &str) -> bool {
        self.contains(name) && self.invokers(name).is_empty()
    }

    pub fn rank_of(&self, name: &str) -> Option<u32> {
        self.node(name).map(|n| n.rank)
    }

    /// Concrete instances of one function, in ascending rank order.
    pub fn instances_of(&self, name: &str) -> Vec<InstanceId> {
        match self.rank_of(name) {
            Some(rank) => InstanceId::expand(name, rank),
            None => Vec::new(),
        }
    }

    /// Every instance of every function, in declaration then rank order.
    pub fn instances(&self) -> Vec<InstanceId> {
        self.nodes
            .iter()
            .flat_map(|n| InstanceId::expand(&n.name, n.rank))
            .collect()
    }
}
