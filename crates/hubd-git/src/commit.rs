//! Commit history

use serde::Serialize;

use crate::repo::Repository;
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub date: String,
}

impl Repository {
    /// The history reachable from `revision`, newest first, at most `limit`
    /// entries. An unresolvable revision yields an empty list: model-info
    /// callers probe empty repositories and must not see an error.
    pub fn commits(&self, revision: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        let commit = match self.resolve_commit(revision)? {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut walk = self.raw().revwalk()?;
        walk.push(commit.id())?;

        let mut commits = Vec::new();
        for oid in walk {
            if commits.len() >= limit {
                break;
            }
            let oid = oid?;
            let c = self.raw().find_commit(oid)?;
            let author = c.author();
            commits.push(CommitInfo {
                sha: oid.to_string(),
                message: c.message().unwrap_or_default().to_string(),
                author: author.name().unwrap_or_default().to_string(),
                email: author.email().unwrap_or_default().to_string(),
                date: format_time(author.when()),
            });
        }
        Ok(commits)
    }
}

pub(crate) fn format_time(time: git2::Time) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(time.seconds(), 0)
        .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::testutil::{commit_files, init_at};
    use tempfile::TempDir;

    #[test]
    fn test_commits_newest_first_with_limit() {
        let dir = TempDir::new().unwrap();
        let repo = init_at(dir.path(), "r.git");
        commit_files(&repo, "main", &[("f.txt", b"1")], "first");
        let second = commit_files(&repo, "main", &[("f.txt", b"2")], "second");
        let third = commit_files(&repo, "main", &[("f.txt", b"3")], "third");

        let commits = repo.commits("main", 2).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, third.to_string());
        assert_eq!(commits[1].sha, second.to_string());
        assert_eq!(commits[0].message, "third");
        assert_eq!(commits[0].author, "Test");
        assert_eq!(commits[0].email, "test@test.com");
        assert!(commits[0].date.ends_with('Z'));
    }

    #[test]
    fn test_commits_prefix_property() {
        let dir = TempDir::new().unwrap();
        let repo = init_at(dir.path(), "r.git");
        for i in 0..4 {
            commit_files(&repo, "main", &[("f.txt", format!("{i}").as_bytes())], "c");
        }

        let two = repo.commits("main", 2).unwrap();
        let three = repo.commits("main", 3).unwrap();
        assert_eq!(
            two.iter().map(|c| &c.sha).collect::<Vec<_>>(),
            three.iter().take(2).map(|c| &c.sha).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_commits_empty_repository() {
        let dir = TempDir::new().unwrap();
        let repo = init_at(dir.path(), "r.git");
        assert!(repo.commits("main", 10).unwrap().is_empty());
        assert!(repo.commits("", 10).unwrap().is_empty());
    }
}
