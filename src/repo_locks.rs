//! Per-repository write serialization
//!
//! Pushes, imports and syncs of the same repository must not interleave.
//! Each repository path maps to one async mutex; holders keep the guard for
//! the duration of the mutating operation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub struct RepoWriteLocks {
    inner: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoWriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for the repository at `path`, waiting if a
    /// mutating operation is already in flight.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}
