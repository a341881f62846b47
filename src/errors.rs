// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::store::StoreError;
use crate::types::FunctionStatus;

#[derive(Error, Debug)]
pub enum DagpollError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Missing configuration, credentials or a malformed graph. Always
    /// raised before any background worker starts.
    #[error("Error initializing workflow monitor: {0}")]
    Initialization(String),

    #[error("Function not found: {0}")]
    UnknownFunction(String),

    #[error("Cycle detected in invocation graph: {0}")]
    DagCycle(String),

    /// Overwriting a final status. This is a programming error, never a
    /// runtime condition to recover from.
    #[error("Illegal status transition for {instance}: {from} -> {to}")]
    IllegalTransition {
        instance: String,
        from: FunctionStatus,
        to: FunctionStatus,
    },

    #[error("Workflow monitor already started")]
    AlreadyStarted,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagpollError>;
