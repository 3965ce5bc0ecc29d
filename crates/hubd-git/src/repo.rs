//! Opening, initializing and resolving revisions of bare repositories

use std::path::{Path, PathBuf};

use git2::ErrorCode;

use crate::{Error, Result};

/// Structural check for a bare repository layout: a HEAD file plus objects
/// and refs directories.
pub fn is_repository(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir() && path.join("refs").is_dir()
}

/// A handle onto one bare on-disk repository.
pub struct Repository {
    path: PathBuf,
    inner: git2::Repository,
}

// git2::Repository is already `Send` (see upstream `unsafe impl Send`);
// libgit2 handles are not used concurrently here, only moved across the
// await points of single-threaded-at-a-time async callers, so it's safe
// to additionally treat a handle as shareable-by-reference across threads.
unsafe impl Sync for Repository {}

impl Repository {
    /// Open an existing bare repository.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !is_repository(&path) {
            return Err(Error::RepositoryNotExists);
        }
        let inner = git2::Repository::open(&path)?;
        Ok(Self { path, inner })
    }

    /// Create a new bare repository whose HEAD points at
    /// `refs/heads/<default_branch>`. Fails if the path already holds
    /// anything.
    pub fn init(path: impl Into<PathBuf>, default_branch: &str) -> Result<Self> {
        let path = path.into();
        if path.exists() && std::fs::read_dir(&path)?.next().is_some() {
            return Err(Error::RepositoryExists);
        }
        let mut opts = git2::RepositoryInitOptions::new();
        opts.bare(true)
            .initial_head(&format!("refs/heads/{default_branch}"));
        let inner = git2::Repository::init_opts(&path, &opts)?;
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn raw(&self) -> &git2::Repository {
        &self.inner
    }

    /// The branch HEAD symbolically points at, or an empty string when HEAD
    /// is missing or detached.
    pub fn default_branch(&self) -> String {
        match self.inner.find_reference("HEAD") {
            Ok(head) => head
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/heads/"))
                .unwrap_or_default()
                .to_string(),
            Err(_) => String::new(),
        }
    }

    /// Resolve a revision name to a commit: branches win, then a name that
    /// looks like a full commit id is tried as one. `None` means the name
    /// does not resolve, which callers treat as an empty repository rather
    /// than an error.
    pub(crate) fn resolve_commit(&self, name: &str) -> Result<Option<git2::Commit<'_>>> {
        if name.is_empty() {
            return Ok(None);
        }
        match self.inner.find_reference(&format!("refs/heads/{name}")) {
            Ok(reference) => Ok(Some(reference.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                if !is_valid_sha(name) {
                    return Ok(None);
                }
                let oid = match git2::Oid::from_str(name) {
                    Ok(oid) => oid,
                    Err(_) => return Ok(None),
                };
                match self.inner.find_commit(oid) {
                    Ok(commit) => Ok(Some(commit)),
                    Err(_) => Ok(None),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a revision name to its commit id.
    pub fn resolve_revision(&self, name: &str) -> Option<String> {
        self.resolve_commit(name)
            .ok()
            .flatten()
            .map(|c| c.id().to_string())
    }

    /// Split a combined `<revision>/<path>` string as used by the hub
    /// `resolve` and `tree` URLs, which do not delimit the two. Every
    /// prefix of the segments is tried as a revision and the longest one
    /// that resolves wins; when nothing resolves the first segment is taken
    /// as the revision so the error surfaces at blob lookup.
    pub fn split_revision_and_path(&self, refpath: &str) -> (String, String) {
        let segments: Vec<&str> = refpath.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return (String::new(), String::new());
        }
        for end in (1..=segments.len()).rev() {
            let candidate = segments[..end].join("/");
            if self.resolve_commit(&candidate).ok().flatten().is_some() {
                return (candidate, segments[end..].join("/"));
            }
        }
        (segments[0].to_string(), segments[1..].join("/"))
    }
}

/// A full git object id: exactly 40 lowercase hex characters.
pub(crate) fn is_valid_sha(s: &str) -> bool {
    s.len() == 40
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
