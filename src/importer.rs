//! Import/sync engine
//!
//! A background consumer of the task queue. A fresh import discovers the
//! remote's default branch from its `info/refs` advertisement, initializes
//! a bare repository marked as a mirror, shallow-fetches refs and finally
//! pulls LFS objects into the content store. Re-syncs of an existing
//! mirror skip straight to the fetch. Transport steps are retried with
//! exponential backoff; a task failure is recorded and never kills the
//! consumer loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use hubd_lfs::{remote::lfs_endpoint, ContentStore, RemoteClient};

use crate::paths::clean_join;
use crate::queue::{Task, TaskQueue, TaskStatus};
use crate::repo_locks::RepoWriteLocks;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(500);

pub struct Importer {
    root: PathBuf,
    queue: Arc<TaskQueue>,
    content: Arc<ContentStore>,
    write_locks: Arc<RepoWriteLocks>,
    http: reqwest::Client,
}

impl Importer {
    pub fn new(
        root: PathBuf,
        queue: Arc<TaskQueue>,
        content: Arc<ContentStore>,
        write_locks: Arc<RepoWriteLocks>,
    ) -> Self {
        Self {
            root,
            queue,
            content,
            write_locks,
            http: reqwest::Client::new(),
        }
    }

    /// Start the consumer loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.queue.next_pending() {
                    Some(task) => self.run_task(task).await,
                    None => tokio::time::sleep(IDLE_POLL).await,
                }
            }
        })
    }

    async fn run_task(&self, task: Task) {
        info!(id = %task.id, repository = %task.repository, "starting sync task");
        let outcome = self.execute(&task).await;
        let update = match &outcome {
            Ok(()) => self.queue.update(&task.id, |t| {
                t.status = TaskStatus::Succeeded;
                t.progress = 100;
                t.progress_msg = "done".to_string();
            }),
            Err(e) => {
                warn!(id = %task.id, error = %format!("{e:#}"), "sync task failed");
                let message = format!("{e:#}");
                self.queue.update(&task.id, |t| {
                    t.status = TaskStatus::Failed;
                    t.error = Some(message);
                })
            }
        };
        if let Err(e) = update {
            warn!(id = %task.id, error = %e, "failed to record task outcome");
        }
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let source_url = task
            .params
            .get("source_url")
            .context("task has no source_url parameter")?
            .clone();
        let repo_path = clean_join(&self.root, &task.repository)
            .context("repository name escapes the root directory")?;

        let _guard = self.write_locks.lock(&repo_path).await;

        if !hubd_git::is_repository(&repo_path) {
            self.step(task, 10, "discovering default branch")?;
            let branch = retry(RETRY_ATTEMPTS, || {
                self.discover_default_branch(&source_url)
            })
            .await?;
            self.step(task, 20, "initializing repository")?;

            let path = repo_path.clone();
            let url = source_url.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                let repo = hubd_git::Repository::init(&path, &branch)?;
                repo.set_mirror_remote(&url)?;
                Ok(())
            })
            .await??;
        }

        self.step(task, 70, "fetching refs")?;
        retry(RETRY_ATTEMPTS, || async {
            let repo = hubd_git::Repository::open(&repo_path)?;
            repo.sync_mirror().await?;
            Ok(())
        })
        .await?;
        self.step(task, 100, "fetching lfs objects")?;

        let path = repo_path.clone();
        let objects = tokio::task::spawn_blocking(move || -> Result<_> {
            let repo = hubd_git::Repository::open(&path)?;
            let branch = repo.default_branch();
            Ok(repo.lfs_objects(&branch)?)
        })
        .await??;

        if !objects.is_empty() {
            let endpoint = lfs_endpoint(&source_url);
            let client = RemoteClient::with_client(self.http.clone());
            retry(RETRY_ATTEMPTS, || async {
                client
                    .fetch_and_store(&endpoint, &objects, &self.content)
                    .await?;
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    fn step(&self, task: &Task, progress: u8, message: &str) -> Result<()> {
        let message = message.to_string();
        self.queue.update(&task.id, move |t| {
            t.progress = progress;
            t.progress_msg = message;
        })
    }

    /// GET the remote's `info/refs` advertisement and extract the default
    /// branch from the symref capability.
    async fn discover_default_branch(&self, source_url: &str) -> Result<String> {
        let url = format!(
            "{}/info/refs?service=git-upload-pack",
            source_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, "git/2.0")
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;
        if !response.status().is_success() {
            bail!("unexpected status code: {}", response.status());
        }
        let body = response.bytes().await?;
        Ok(hubd_git::pktline::parse_default_branch(&body)?)
    }
}

async fn retry<T, F, Fut>(attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut last_err = None;
    for attempt in 0..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt + 1 < attempts {
                    warn!(attempt = attempt + 1, error = %format!("{e:#}"), "retrying after transport error");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("retry with zero attempts")))
}
