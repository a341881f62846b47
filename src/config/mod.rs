// src/config/mod.rs

//! Workflow file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate it before anything is started (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_and_validate_with_env, load_from_path};
pub use model::{
    FunctionConfig, MonitorSection, RawWorkflowFile, StoreSection, WorkflowFile, WorkflowSection,
};
