// src/dag/resolver.rs

//! Decides whether a pending instance was invoked.

use tracing::{trace, warn};

use crate::dag::graph::WorkflowGraph;
use crate::dag::instance::{FunctionInstance, InstanceTable};
use crate::types::InvocationStatus;

/// Read-only view over the graph and the instance table used to resolve
/// invocation status.
///
/// Invokers are visited in graph declaration order, and each invoker's ranks
/// in ascending order. The result does not depend on that order; fixing it
/// only keeps diagnostics reproducible.
pub struct InvocationResolver<'a> {
    graph: &'a WorkflowGraph,
    instances: &'a InstanceTable,
}

impl<'a> InvocationResolver<'a> {
    pub fn new(graph: &'a WorkflowGraph, instances: &'a InstanceTable) -> Self {
        Self { graph, instances }
    }

    /// Resolve the invocation status of `instance`.
    ///
    /// - Any completed invoker that invoked the function wins immediately.
    /// - A not-yet-completed invoker makes the answer undecidable for now.
    /// - If every invoker completed without invoking it, it was not invoked.
    pub fn resolve(&self, instance: &FunctionInstance) -> InvocationStatus {
        let base = instance.id().base();

        for invoker in self.graph.invokers(base) {
            for invoker_id in self.graph.instances_of(invoker) {
                let invoker_name = invoker_id.name();
                let Some(invoker_instance) = self.instances.get(&invoker_name) else {
                    // Should not happen for a table built from the same graph.
                    warn!(
                        instance = %instance.name(),
                        invoker = %invoker_name,
                        "invoker missing from instance table"
                    );
                    return InvocationStatus::Pending;
                };

                match invoker_instance.invoked_children() {
                    Some(children) if children.contains(base) => {
                        trace!(
                            instance = %instance.name(),
                            invoker = %invoker_name,
                            "invoked by completed invoker"
                        );
                        return InvocationStatus::Invoked;
                    }
                    Some(_) => {
                        // Completed without invoking us; try the next one.
                    }
                    None => return InvocationStatus::Pending,
                }
            }
        }

        InvocationStatus::NotInvoked
    }
}
