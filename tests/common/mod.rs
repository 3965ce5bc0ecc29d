//! Shared harness for API tests: a server on an ephemeral port over a
//! scratch repository root, plus helpers to plant commits directly in the
//! served bare repositories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hubd::{AppState, HubServer, Importer};
use tempfile::TempDir;

pub struct TestServer {
    pub base: String,
    pub root: PathBuf,
    pub state: AppState,
    _tmp: TempDir,
}

pub async fn spawn_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let state = AppState::new(&tmp.path().join("data")).unwrap();
    spawn_with_state(state, tmp).await
}

pub async fn spawn_with_state(state: AppState, tmp: TempDir) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let root = state.root.clone();
    let server = HubServer::new(state.clone(), addr.to_string());
    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });
    TestServer {
        base: format!("http://{addr}"),
        root,
        state,
        _tmp: tmp,
    }
}

impl TestServer {
    /// Start the import/sync consumer for this server's queue.
    pub fn spawn_importer(&self) {
        let importer = Importer::new(
            self.root.clone(),
            self.state.queue.clone().unwrap(),
            self.state.content.clone(),
            self.state.write_locks.clone(),
        );
        importer.spawn();
    }
}

/// Create a commit on `branch` of the bare repository at `repo_path`,
/// replacing the tree with `files`. Returns the commit id.
pub fn commit_files(repo_path: &Path, branch: &str, files: &[(&str, &[u8])], message: &str) -> String {
    let repo = git2::Repository::open(repo_path).unwrap();
    let blobs: Vec<(String, git2::Oid)> = files
        .iter()
        .map(|(path, data)| (path.to_string(), repo.blob(data).unwrap()))
        .collect();
    let tree_oid = build_tree(&repo, &blobs);
    let tree = repo.find_tree(tree_oid).unwrap();

    let sig = git2::Signature::now("Test", "test@test.com").unwrap();
    let refname = format!("refs/heads/{branch}");
    let parent = repo
        .find_reference(&refname)
        .ok()
        .and_then(|r| r.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
        .unwrap()
        .to_string()
}

fn build_tree(repo: &git2::Repository, entries: &[(String, git2::Oid)]) -> git2::Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let mut subdirs: BTreeMap<String, Vec<(String, git2::Oid)>> = BTreeMap::new();
    for (path, oid) in entries {
        match path.split_once('/') {
            Some((dir, rest)) => subdirs
                .entry(dir.to_string())
                .or_default()
                .push((rest.to_string(), *oid)),
            None => {
                builder.insert(path, *oid, 0o100644).unwrap();
            }
        }
    }
    for (dir, sub) in subdirs {
        let sub_oid = build_tree(repo, &sub);
        builder.insert(&dir, sub_oid, 0o040000).unwrap();
    }
    builder.write().unwrap()
}

pub fn lfs_pointer(oid: &str, size: u64) -> String {
    format!("version https://git-lfs.github.com/spec/v1\noid sha256:{oid}\nsize {size}\n")
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok()
}
