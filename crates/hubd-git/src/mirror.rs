//! Mirror configuration and synchronization
//!
//! A repository is a mirror iff its `origin` remote carries the mirror
//! flag. Synchronization shallow-fetches the default branch and then all
//! branches at depth 1; deep history is intentionally not mirrored.

use std::process::Stdio;

use git2::ErrorCode;
use tokio::process::Command;
use tracing::debug;

use crate::repo::Repository;
use crate::{Error, Result};

impl Repository {
    /// Whether this repository mirrors a remote, and the remote's URL.
    pub fn is_mirror(&self) -> Result<(bool, String)> {
        let config = self.raw().config()?.snapshot()?;
        let mirror = match config.get_bool("remote.origin.mirror") {
            Ok(v) => v,
            Err(e) if e.code() == ErrorCode::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let url = match config.get_string("remote.origin.url") {
            Ok(v) => v,
            Err(e) if e.code() == ErrorCode::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Ok((mirror, url))
    }

    /// Record `url` as the mirrored origin.
    pub fn set_mirror_remote(&self, url: &str) -> Result<()> {
        let mut config = self.raw().config()?;
        config.set_str("remote.origin.url", url)?;
        config.set_str("remote.origin.fetch", "+refs/heads/*:refs/heads/*")?;
        config.set_bool("remote.origin.mirror", true)?;
        Ok(())
    }

    /// Shallow-fetch the default branch, then all branches, from origin.
    pub async fn sync_mirror(&self) -> Result<()> {
        let branch = self.default_branch();
        self.fetch_shallow(&branch).await?;
        self.fetch_shallow("*").await
    }

    async fn fetch_shallow(&self, branch: &str) -> Result<()> {
        debug!(repo = %self.path().display(), branch, "shallow fetch");
        let status = Command::new("git")
            .arg("fetch")
            .arg("--depth=1")
            .arg("origin")
            .arg(format!("+refs/heads/{branch}:refs/heads/{branch}"))
            .arg("--progress")
            .current_dir(self.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Transport(format!("failed to spawn git fetch: {e}")))?;
        if !status.success() {
            return Err(Error::Transport(format!(
                "git fetch of {branch} exited with {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{commit_files, init_at};
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok()
    }

    #[test]
    fn test_mirror_config_roundtrip() {
        let dir = TempDir::new().unwrap();
        let repo = init_at(dir.path(), "m.git");

        let (is_mirror, url) = repo.is_mirror().unwrap();
        assert!(!is_mirror);
        assert!(url.is_empty());

        repo.set_mirror_remote("https://remote/x.git").unwrap();
        let (is_mirror, url) = repo.is_mirror().unwrap();
        assert!(is_mirror);
        assert_eq!(url, "https://remote/x.git");
    }

    #[tokio::test]
    async fn test_sync_mirror_from_local_source() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }

        let dir = TempDir::new().unwrap();
        let source = init_at(dir.path(), "source.git");
        let tip = commit_files(&source, "main", &[("README.md", b"mirrored")], "initial");

        let mirror = crate::Repository::init(dir.path().join("mirror.git"), "main").unwrap();
        mirror
            .set_mirror_remote(source.path().to_str().unwrap())
            .unwrap();
        mirror.sync_mirror().await.unwrap();

        assert_eq!(mirror.resolve_revision("main").unwrap(), tip.to_string());
        assert_eq!(mirror.blob("main", "README.md").unwrap().bytes(), b"mirrored");
    }

    #[tokio::test]
    async fn test_sync_mirror_without_origin_fails() {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }

        let dir = TempDir::new().unwrap();
        let repo = init_at(dir.path(), "lonely.git");
        assert!(repo.sync_mirror().await.is_err());
    }
}
