use dagpoll::store::{MemoryStore, done_key, failed_key, log_key};

/// Plays the execution side of a workflow: writes the log lines,
/// completion manifests and failure markers a function instance would leave
/// in the store.
#[derive(Debug, Clone)]
pub struct FakeExecution {
    store: MemoryStore,
    folder: String,
}

impl FakeExecution {
    pub fn new(store: MemoryStore, folder: &str) -> Self {
        Self {
            store,
            folder: folder.to_string(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn log_key(&self, instance: &str) -> String {
        log_key(&self.folder, instance)
    }

    /// Create the (empty) log artifact, which makes the instance RUNNING.
    pub fn start(&self, instance: &str) {
        self.store.put(self.log_key(instance), Vec::new());
    }

    pub fn log(&self, instance: &str, line: &str) {
        self.store.append_line(&self.log_key(instance), line);
    }

    /// Write the completion manifest listing the invoked base functions.
    pub fn complete(&self, instance: &str, invoked: &[&str]) {
        let manifest = serde_json::json!({ "invoked": invoked });
        self.store
            .put(done_key(&self.folder, instance), manifest.to_string());
    }

    pub fn fail(&self, instance: &str) {
        self.store
            .put(failed_key(&self.folder, instance), "failed".to_string());
    }
}
