//! Job-scoped resources: the work directory and spawned subprocesses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelsmith_common::ReelResult;
use tempfile::TempDir;

use crate::command::ProcessRegistry;

/// Owns everything a job creates outside its output file.
///
/// Dropping the scope, on success or failure, kills and reaps any subprocess
/// still running and removes the work directory with all intermediates.
#[derive(Debug)]
pub struct JobScope {
    registry: Arc<ProcessRegistry>,
    // Dropped after the registry is drained; see `Drop`.
    work_dir: TempDir,
}

impl JobScope {
    /// Create a scope with a fresh work directory under the system temp dir.
    pub fn new() -> ReelResult<Self> {
        let work_dir = tempfile::Builder::new().prefix("reelsmith-").tempdir()?;
        Ok(Self::with_dir(work_dir))
    }

    /// Create a scope with its work directory under `parent`.
    pub fn new_in(parent: &Path) -> ReelResult<Self> {
        std::fs::create_dir_all(parent)?;
        let work_dir = tempfile::Builder::new()
            .prefix("reelsmith-")
            .tempdir_in(parent)?;
        Ok(Self::with_dir(work_dir))
    }

    fn with_dir(work_dir: TempDir) -> Self {
        tracing::debug!(work_dir = %work_dir.path().display(), "Job scope opened");
        Self {
            registry: Arc::new(ProcessRegistry::new()),
            work_dir,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Path for an intermediate file inside the work directory.
    pub fn intermediate(&self, name: &str) -> PathBuf {
        self.work_dir.path().join(name)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Owned handle to the registry, for components that outlive a borrow.
    pub fn registry_handle(&self) -> Arc<ProcessRegistry> {
        Arc::clone(&self.registry)
    }
}

impl Drop for JobScope {
    fn drop(&mut self) {
        let killed = self.registry.kill_all();
        if killed > 0 {
            tracing::warn!(killed, "Reaped leftover subprocesses");
        }
        tracing::debug!(work_dir = %self.work_dir.path().display(), "Job scope closed");
    }
}
