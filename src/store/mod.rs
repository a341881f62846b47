// src/store/mod.rs

//! Object store boundary.
//!
//! Function instances never talk to each other directly; everything the
//! monitor learns comes from artifacts they write into a shared store. The
//! store only has to answer two questions: does a key exist, and what are
//! its bytes. A missing object is reported as [`StoreError::NotFound`], which
//! callers treat as "not written yet" rather than as a failure.
//!
//! - [`DirectoryStore`] maps keys onto files below a root directory (a local
//!   checkout of a bucket, or a mounted one).
//! - [`memory::MemoryStore`] keeps objects in memory and is what the tests
//!   write into while simulating the execution side.

use std::fmt::Debug;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The object does not exist (yet). Expected while polling.
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("store error for '{key}': {message}")]
    Backend { key: String, message: String },

    #[error("IO error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed completion manifest '{key}': {message}")]
    Manifest { key: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn key(&self) -> &str {
        match self {
            StoreError::NotFound { key }
            | StoreError::Backend { key, .. }
            | StoreError::Io { key, .. }
            | StoreError::Manifest { key, .. } => key,
        }
    }
}

/// Abstract object store interface.
///
/// Implementations must be cheap to share behind an `Arc`; the workflow
/// monitor and every function log monitor hold a handle to the same store.
pub trait ObjectStore: Send + Sync + Debug {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Fetch the full object. Fails with [`StoreError::NotFound`] when absent.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Fetch the object and decode it as UTF-8.
    fn get_string<'a>(&'a self, key: &'a str) -> StoreFuture<'a, String> {
        Box::pin(async move {
            let bytes = self.get(key).await?;
            String::from_utf8(bytes).map_err(|e| StoreError::Backend {
                key: key.to_string(),
                message: format!("object is not valid UTF-8: {e}"),
            })
        })
    }
}

/// Key of the log artifact written by one function instance.
pub fn log_key(invocation_folder: &str, instance: &str) -> String {
    join_key(invocation_folder, &format!("{instance}.txt"))
}

/// Key of the completion manifest written when an instance finishes.
pub fn done_key(invocation_folder: &str, instance: &str) -> String {
    join_key(
        invocation_folder,
        &format!("function_completions/{instance}.done"),
    )
}

/// Key of the marker written when an instance fails.
pub fn failed_key(invocation_folder: &str, instance: &str) -> String {
    join_key(
        invocation_folder,
        &format!("function_completions/{instance}.failed"),
    )
}

fn join_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Store backed by a directory tree: key `a/b.txt` is the file
/// `<root>/a/b.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes_root {
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "key must be a relative path inside the store root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for DirectoryStore {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(source) => Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                }),
            }
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.path_for(key)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                    key: key.to_string(),
                }),
                Err(source) => Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                }),
            }
        })
    }
}
