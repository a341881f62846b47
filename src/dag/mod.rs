// src/dag/mod.rs

//! Invocation graph and function instances.
//!
//! - [`graph`] holds the static forward/reverse invocation graph and rank
//!   counts.
//! - [`instance`] expands functions into concrete instances and owns the
//!   per-instance status with its transition rules.
//! - [`resolver`] decides whether a pending instance was invoked, using the
//!   reverse graph and what completed invokers reported.

pub mod graph;
pub mod instance;
pub mod resolver;

pub use graph::WorkflowGraph;
pub use instance::{FunctionInstance, InstanceId, InstanceTable};
pub use resolver::InvocationResolver;
