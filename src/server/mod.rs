mod auth;
mod dispatch;
mod error;
mod git;
mod hub;
mod import_api;
mod locks;
mod repos;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use hubd_lfs::{ContentStore, LockStore, SignedUrlStore};

use crate::queue::TaskQueue;
use crate::repo_locks::RepoWriteLocks;

pub use error::{ApiError, ApiResult};

/// Shared handler state. The content store, lock store and task queue are
/// the only process-wide singletons; they are constructed once against the
/// root directory and passed in explicitly.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub content: Arc<ContentStore>,
    pub signer: Option<Arc<dyn SignedUrlStore>>,
    pub locks: Arc<LockStore>,
    pub queue: Option<Arc<TaskQueue>>,
    pub write_locks: Arc<RepoWriteLocks>,
}

impl AppState {
    /// Build the stores against `root`, creating the directory layout.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("failed to create repository root {}", root.display()))?;
        let queue = TaskQueue::open(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            content: Arc::new(ContentStore::new(root.join(".lfs-content"))),
            signer: None,
            locks: Arc::new(LockStore::new(root.join(".lfs-locks"))),
            queue: Some(Arc::new(queue)),
            write_locks: Arc::new(RepoWriteLocks::new()),
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn SignedUrlStore>) -> Self {
        self.signer = Some(signer);
        self
    }
}

pub struct HubServer {
    state: AppState,
    addr: String,
}

impl HubServer {
    pub fn new(state: AppState, addr: impl Into<String>) -> Self {
        Self {
            state,
            addr: addr.into(),
        }
    }

    pub fn router(&self) -> Router {
        // Repository names may contain slashes and the `.git` suffix marks
        // where they end, which a route table cannot express; a single
        // dispatcher parses the path shapes itself.
        Router::new()
            .fallback(dispatch::dispatch)
            .with_state(self.state.clone())
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        self.run_with_listener(listener).await
    }

    pub async fn run_with_listener(self, listener: tokio::net::TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, root = %self.state.root.display(), "serving repositories");
        let app = self.router();
        axum::serve(listener, app).await?;
        Ok(())
    }
}
