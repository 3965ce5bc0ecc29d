//! Advisory LFS file locks
//!
//! One JSON document per lock under `<root>/<repo>/<id>.json`. Paths are
//! unique among live locks within a repository; only the owner may release
//! a lock unless `force` is set. Listings are pages over a stable
//! `(locked_at, id)` order with opaque cursors.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lock {
    pub id: String,
    pub path: String,
    pub owner: Owner,
    pub locked_at: DateTime<Utc>,
}

/// Persistent per-repository lock table.
#[derive(Debug)]
pub struct LockStore {
    root: PathBuf,
    // Serializes add/delete so the path-uniqueness check cannot race.
    write: Mutex<()>,
}

const DEFAULT_PAGE_LIMIT: usize = 100;

impl LockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write: Mutex::new(()),
        }
    }

    fn repo_dir(&self, repo: &str) -> Result<PathBuf> {
        // Repository names may be nested (org/name.git) but must stay under
        // the lock root.
        let rel = Path::new(repo);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidRepository(repo.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Add a lock, rejecting the call if the path is already locked.
    pub fn add(&self, repo: &str, lock: Lock) -> Result<()> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let existing = self.load_all(repo)?;
        if existing.iter().any(|l| l.path == lock.path) {
            return Err(Error::AlreadyLocked);
        }

        let dir = self.repo_dir(repo)?;
        std::fs::create_dir_all(&dir)?;
        let temp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&temp, &lock)?;
        temp.persist(dir.join(format!("{}.json", lock.id)))
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// List locks, optionally filtered to an exact path, returning at most
    /// `limit` entries (0 means the default of 100) and a cursor for the
    /// next page. The cursor is empty when the page is the last.
    pub fn filtered(
        &self,
        repo: &str,
        path: &str,
        cursor: &str,
        limit: usize,
    ) -> Result<(Vec<Lock>, String)> {
        let mut locks = self.load_all(repo)?;
        locks.sort_by(|a, b| (a.locked_at, &a.id).cmp(&(b.locked_at, &b.id)));
        if !path.is_empty() {
            locks.retain(|l| l.path == path);
        }

        let start = if cursor.is_empty() {
            0
        } else {
            decode_cursor(cursor)? as usize
        };
        let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };

        if start >= locks.len() {
            return Ok((Vec::new(), String::new()));
        }
        let end = (start + limit).min(locks.len());
        let next_cursor = if end < locks.len() {
            encode_cursor(end as u64)
        } else {
            String::new()
        };
        Ok((locks[start..end].to_vec(), next_cursor))
    }

    /// Release a lock. Returns `Ok(None)` when no such lock exists (the
    /// operation is idempotent) and refuses to release another user's lock
    /// unless `force` is set.
    pub fn delete(&self, repo: &str, user: &str, id: &str, force: bool) -> Result<Option<Lock>> {
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());
        if id.is_empty() || id.contains('/') || id.contains('\\') {
            return Ok(None);
        }
        let path = self.repo_dir(repo)?.join(format!("{id}.json"));
        let data = match std::fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let lock: Lock = serde_json::from_slice(&data)?;
        if !force && lock.owner.name != user {
            return Err(Error::NotOwner);
        }
        std::fs::remove_file(&path)?;
        Ok(Some(lock))
    }

    fn load_all(&self, repo: &str) -> Result<Vec<Lock>> {
        let dir = self.repo_dir(repo)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut locks = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path) {
                Ok(data) => match serde_json::from_slice(&data) {
                    Ok(lock) => locks.push(lock),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable lock record")
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(locks)
    }
}

/// Encode a starting offset into an opaque cursor.
pub fn encode_cursor(id: u64) -> String {
    format!(
        "c-{}",
        base64::engine::general_purpose::URL_SAFE.encode(id.to_be_bytes())
    )
}

/// Decode a cursor produced by [`encode_cursor`].
pub fn decode_cursor(cursor: &str) -> Result<u64> {
    if cursor.is_empty() {
        return Err(Error::InvalidCursor("cursor is empty".into()));
    }
    let rest = cursor
        .strip_prefix("c-")
        .ok_or_else(|| Error::InvalidCursor("invalid cursor format".into()))?;
    let decoded = base64::engine::general_purpose::URL_SAFE
        .decode(rest)
        .map_err(|e| Error::InvalidCursor(e.to_string()))?;
    let bytes: [u8; 8] = decoded
        .try_into()
        .map_err(|_| Error::InvalidCursor("invalid cursor length".into()))?;
    Ok(u64::from_be_bytes(bytes))
}
