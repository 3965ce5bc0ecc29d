//! Blob retrieval

use chrono::{DateTime, Utc};

use crate::repo::Repository;
use crate::{Error, Result};

/// A file at a specific revision. The content is owned, so readers are
/// independent of the underlying object database.
#[derive(Debug, Clone)]
pub struct Blob {
    name: String,
    size: u64,
    mod_time: DateTime<Utc>,
    hash: String,
    content: Vec<u8>,
}

impl Blob {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Committer time of the commit the blob was read at, used for
    /// `Last-Modified`.
    pub fn mod_time(&self) -> DateTime<Utc> {
        self.mod_time
    }

    /// The git object id of the blob.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.content
    }

    /// A fresh reader over the content; each call is independent.
    pub fn reader(&self) -> impl std::io::Read + '_ {
        std::io::Cursor::new(self.content.as_slice())
    }
}

impl Repository {
    /// Look up the file at `path` under `revision`. Unlike the tree and
    /// commit listings, an unresolvable revision here is an error: the
    /// caller asked for a concrete file.
    pub fn blob(&self, revision: &str, path: &str) -> Result<Blob> {
        let commit = self
            .resolve_commit(revision)?
            .ok_or_else(|| Error::RefNotFound(revision.to_string()))?;

        let (dir, file_name) = match path.trim_matches('/').rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path.trim_matches('/')),
        };
        if file_name.is_empty() {
            return Err(Error::PathNotFound(path.to_string()));
        }

        let tree = self.subtree(&commit, dir)?;
        let entry = tree
            .get_name(file_name)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
        let blob = self
            .raw()
            .find_blob(entry.id())
            .map_err(|_| Error::PathNotFound(path.to_string()))?;

        let mod_time = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH);

        Ok(Blob {
            name: file_name.to_string(),
            size: blob.size() as u64,
            mod_time,
            hash: entry.id().to_string(),
            content: blob.content().to_vec(),
        })
    }
}
