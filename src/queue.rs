//! Durable task queue
//!
//! One JSON document per task under `<root>/.queue/`. Tasks survive
//! restarts; a task found in the running state at startup is demoted back
//! to pending so an interrupted import re-runs. Claiming is atomic: the
//! pending→running transition happens under the queue mutex and is
//! persisted before the task is handed to the consumer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    RepositorySync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    Background,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub repository: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub progress: u8,
    pub progress_msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    // Creation tie-break within one timestamp.
    #[serde(default)]
    seq: u64,
}

#[derive(Debug)]
pub struct TaskQueue {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Vec<Task>,
    next_seq: u64,
}

impl TaskQueue {
    /// Open (or create) the queue directory under `root` and load every
    /// persisted task.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(".queue");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create queue directory {}", dir.display()))?;

        let mut inner = Inner::default();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = std::fs::read(&path)?;
            let mut task: Task = match serde_json::from_slice(&data) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable task record");
                    continue;
                }
            };
            // Interrupted mid-run: re-run it.
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Pending;
                persist(&dir, &task)?;
            }
            inner.next_seq = inner.next_seq.max(task.seq + 1);
            inner.tasks.push(task);
        }
        Ok(Self {
            dir,
            inner: Mutex::new(inner),
        })
    }

    /// Enqueue a task and return its id.
    pub fn add(
        &self,
        kind: TaskKind,
        repository: &str,
        priority: TaskPriority,
        params: HashMap<String, String>,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let task = Task {
            id: random_id(),
            kind,
            repository: repository.to_string(),
            created_at: Utc::now(),
            status: TaskStatus::Pending,
            priority,
            progress: 0,
            progress_msg: String::new(),
            error: None,
            params,
            seq: inner.next_seq,
        };
        inner.next_seq += 1;
        persist(&self.dir, &task)?;
        let id = task.id.clone();
        inner.tasks.push(task);
        Ok(id)
    }

    /// All tasks for a repository, newest first. Completed tasks are
    /// retained so callers can observe final status.
    pub fn list_by_repository(&self, repository: &str) -> Vec<Task> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut tasks: Vec<Task> = inner
            .tasks
            .iter()
            .filter(|t| t.repository == repository)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        tasks
    }

    /// Atomically claim the next pending task, moving it to running.
    /// Normal priority goes first; within a level, FIFO by creation.
    pub fn next_pending(&self) -> Option<Task> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let candidate = inner
            .tasks
            .iter_mut()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| (t.priority, t.created_at, t.seq))?;
        candidate.status = TaskStatus::Running;
        if let Err(e) = persist(&self.dir, candidate) {
            warn!(id = %candidate.id, error = %e, "failed to persist task claim");
        }
        Some(candidate.clone())
    }

    /// Apply an update to a task and persist it.
    pub fn update(&self, id: &str, apply: impl FnOnce(&mut Task)) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == id) else {
            bail!("task {id} not found");
        };
        apply(task);
        persist(&self.dir, task)
    }
}

fn persist(dir: &Path, task: &Task) -> Result<()> {
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&temp, task)?;
    temp.persist(dir.join(format!("{}.json", task.id)))
        .with_context(|| format!("failed to persist task {}", task.id))?;
    Ok(())
}

fn random_id() -> String {
    let mut id = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}
