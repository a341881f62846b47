// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ObjectStore, StoreError, StoreFuture};

#[derive(Debug, Default)]
struct MemoryInner {
    objects: BTreeMap<String, Vec<u8>>,
    /// Number of upcoming calls that fail with a backend error.
    failures_pending: usize,
    calls: usize,
}

/// In-memory object store. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.into(), content.into());
    }

    /// Append one line (plus trailing newline), creating the object if needed.
    pub fn append_line(&self, key: &str, line: &str) {
        let mut inner = self.lock();
        let object = inner.objects.entry(key.to_string()).or_default();
        object.extend_from_slice(line.as_bytes());
        object.push(b'\n');
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().objects.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Make the next `count` calls fail with [`StoreError::Backend`].
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_pending = count;
    }

    /// Total number of `exists`/`get` calls served so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    fn begin_call(&self, key: &str) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        let mut inner = self.lock();
        inner.calls += 1;
        if inner.failures_pending > 0 {
            inner.failures_pending -= 1;
            return Err(StoreError::Backend {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(inner)
    }
}

impl ObjectStore for MemoryStore {
    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        let result = self
            .begin_call(key)
            .map(|inner| inner.objects.contains_key(key));
        Box::pin(async move { result })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        let result = self.begin_call(key).and_then(|inner| {
            inner
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    key: key.to_string(),
                })
        });
        Box::pin(async move { result })
    }
}
