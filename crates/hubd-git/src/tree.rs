//! Tree listing
//!
//! Two views over the same data: the flat listing used by the repository
//! API and the hub-shaped listing (sizes, LFS detail, optional recursion)
//! consumed by model-hub clients. An unresolvable revision yields an empty
//! listing so metadata endpoints stay tolerant of empty repositories.

use std::path::Path;

use serde::Serialize;

use hubd_lfs::{LfsObject, Pointer, MAX_POINTER_SIZE};

use crate::repo::Repository;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub mode: String,
    pub sha: String,
    #[serde(rename = "isLfs", skip_serializing_if = "std::ops::Not::not")]
    pub is_lfs: bool,
    #[serde(rename = "blobSha256", skip_serializing_if = "Option::is_none")]
    pub blob_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HfTreeEntry {
    pub oid: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfs: Option<HfTreeLfs>,
    #[serde(rename = "lastCommit", skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<LastCommit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HfTreeLfs {
    pub oid: String,
    pub size: u64,
    #[serde(rename = "pointerSize")]
    pub pointer_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastCommit {
    pub id: String,
    pub title: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HfTreeOptions {
    pub recursive: bool,
    pub expand: bool,
}

impl Repository {
    /// List the entries of the directory `path` at `revision`.
    pub fn tree(&self, revision: &str, path: &str) -> Result<Vec<TreeEntry>> {
        let commit = match self.resolve_commit(revision)? {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let tree = self.subtree(&commit, path)?;

        let mut entries = Vec::new();
        for entry in tree.iter() {
            let name = entry.name().unwrap_or_default().to_string();
            let entry_path = join_path(path, &name);
            let mode = entry.filemode();
            if is_file_mode(mode) {
                let pointer = self.probe_pointer(entry.id());
                entries.push(TreeEntry {
                    name,
                    path: entry_path,
                    kind: "blob".to_string(),
                    mode: format_mode(mode),
                    sha: entry.id().to_string(),
                    is_lfs: pointer.is_some(),
                    blob_sha256: pointer.map(|p| p.oid),
                });
            } else {
                entries.push(TreeEntry {
                    name,
                    path: entry_path,
                    kind: "tree".to_string(),
                    mode: format_mode(mode),
                    sha: entry.id().to_string(),
                    is_lfs: false,
                    blob_sha256: None,
                });
            }
        }
        Ok(entries)
    }

    /// Hub-shaped tree listing. Recursive mode performs a post-order
    /// traversal (children before their directory); `expand` attaches the
    /// listed revision's tip commit to each entry.
    pub fn hf_tree(
        &self,
        revision: &str,
        path: &str,
        opts: &HfTreeOptions,
    ) -> Result<Vec<HfTreeEntry>> {
        let commit = match self.resolve_commit(revision)? {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let last_commit = opts.expand.then(|| LastCommit {
            id: commit.id().to_string(),
            title: commit.summary().unwrap_or_default().to_string(),
            date: crate::commit::format_time(commit.time()),
        });
        let tree = self.subtree(&commit, path)?;

        let mut entries = Vec::new();
        self.collect_hf_entries(&tree, path, opts, &last_commit, &mut entries)?;
        Ok(entries)
    }

    /// All LFS objects reachable from the top of `revision`'s tree.
    pub fn lfs_objects(&self, revision: &str) -> Result<Vec<LfsObject>> {
        let entries = self.hf_tree(revision, "", &HfTreeOptions { recursive: true, expand: false })?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.lfs.map(|l| LfsObject { oid: l.oid, size: l.size }))
            .collect())
    }

    fn collect_hf_entries(
        &self,
        tree: &git2::Tree<'_>,
        prefix: &str,
        opts: &HfTreeOptions,
        last_commit: &Option<LastCommit>,
        out: &mut Vec<HfTreeEntry>,
    ) -> Result<()> {
        for entry in tree.iter() {
            let name = entry.name().unwrap_or_default().to_string();
            let entry_path = join_path(prefix, &name);
            let mode = entry.filemode();
            if is_file_mode(mode) {
                let mut size = 0;
                let mut lfs = None;
                if let Ok(blob) = self.raw().find_blob(entry.id()) {
                    size = blob.size() as u64;
                    if blob.size() as u64 <= MAX_POINTER_SIZE {
                        if let Ok(ptr) = Pointer::decode_bytes(blob.content()) {
                            lfs = Some(HfTreeLfs {
                                oid: ptr.oid,
                                size: ptr.size,
                                pointer_size: blob.size() as u64,
                            });
                        }
                    }
                }
                out.push(HfTreeEntry {
                    oid: entry.id().to_string(),
                    path: entry_path,
                    kind: "file".to_string(),
                    size,
                    lfs,
                    last_commit: last_commit.clone(),
                });
            } else {
                if opts.recursive && entry.kind() == Some(git2::ObjectType::Tree) {
                    let sub = self.raw().find_tree(entry.id())?;
                    self.collect_hf_entries(&sub, &entry_path, opts, last_commit, out)?;
                }
                out.push(HfTreeEntry {
                    oid: entry.id().to_string(),
                    path: entry_path,
                    kind: "directory".to_string(),
                    size: 0,
                    lfs: None,
                    last_commit: last_commit.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn subtree<'r>(
        &'r self,
        commit: &git2::Commit<'r>,
        path: &str,
    ) -> Result<git2::Tree<'r>> {
        let tree = commit.tree()?;
        if path.is_empty() {
            return Ok(tree);
        }
        let entry = tree
            .get_path(Path::new(path))
            .map_err(|_| Error::PathNotFound(path.to_string()))?;
        if entry.kind() != Some(git2::ObjectType::Tree) {
            return Err(Error::NotADirectory(path.to_string()));
        }
        Ok(self.raw().find_tree(entry.id())?)
    }

    pub(crate) fn probe_pointer(&self, oid: git2::Oid) -> Option<Pointer> {
        let blob = self.raw().find_blob(oid).ok()?;
        if blob.size() as u64 > MAX_POINTER_SIZE {
            return None;
        }
        Pointer::decode_bytes(blob.content()).ok()
    }
}

fn is_file_mode(mode: i32) -> bool {
    matches!(mode, 0o100644 | 0o100755 | 0o120000)
}

fn format_mode(mode: i32) -> String {
    match mode {
        0o040000 => "dir".to_string(),
        0o100644 => "regular".to_string(),
        0o100755 => "executable".to_string(),
        0o120000 => "symlink".to_string(),
        0o160000 => "submodule".to_string(),
        other => format!("unknown({other:07o})"),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
