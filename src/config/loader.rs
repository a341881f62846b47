// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw
/// `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawWorkflowFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a workflow file, fill in environment overrides from the process
/// environment, and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    load_and_validate_with_env(path, |key| std::env::var(key).ok())
}

/// Same as [`load_and_validate`] with an explicit environment lookup.
pub fn load_and_validate_with_env<F>(path: impl AsRef<Path>, env: F) -> Result<WorkflowFile>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = load_from_path(&path)?;
    raw.apply_env(env);
    WorkflowFile::try_from(raw)
}
