//! Content-addressed LFS object store
//!
//! Objects are stored at `<root>/<oid[0..2]>/<oid>`; the two-character
//! prefix bounds directory fanout. Writes stream into a temporary sibling
//! file and rename into place only after the sha-256 of the bytes has been
//! checked against the key.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::pointer::is_valid_oid;
use crate::{Error, Result};

/// Content-addressed file store keyed by LFS oid.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, oid: &str) -> Result<PathBuf> {
        if !is_valid_oid(oid) {
            return Err(Error::InvalidOid(oid.to_string()));
        }
        Ok(self.root.join(&oid[..2]).join(oid))
    }

    /// Open the object for sequential reading. The returned metadata carries
    /// the modification time used for `Last-Modified`.
    pub async fn get(&self, oid: &str) -> Result<(tokio::fs::File, std::fs::Metadata)> {
        let path = self.object_path(oid)?;
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ObjectNotFound(oid.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        Ok((file, meta))
    }

    pub async fn exists(&self, oid: &str) -> bool {
        match self.object_path(oid) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Stream `reader` into the store under `oid`. The write is atomic: the
    /// bytes land in a temporary file that is renamed into place only when
    /// the full content has been read and its sha-256 matches `oid`.
    pub async fn put(&self, oid: &str, reader: &mut (impl AsyncRead + Unpin)) -> Result<()> {
        let path = self.object_path(oid)?;
        let dir = path.parent().ok_or_else(|| Error::InvalidOid(oid.to_string()))?;
        tokio::fs::create_dir_all(dir).await?;

        let temp = tempfile::NamedTempFile::new_in(dir)?;
        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            written += n as u64;
        }
        file.flush().await?;

        let actual = hex::encode(hasher.finalize());
        if actual != oid {
            // Dropping the temp file removes it.
            return Err(Error::HashMismatch {
                oid: oid.to_string(),
                actual,
            });
        }

        temp.persist(&path).map_err(|e| Error::Io(e.error))?;
        debug!(oid, bytes = written, "stored lfs object");
        Ok(())
    }
}

/// Alternative backend that hands out signed download URLs instead of
/// serving bytes. When configured, the resolve endpoint redirects to the
/// signed URL; the local store and a signer are mutually exclusive per
/// deployment.
pub trait SignedUrlStore: Send + Sync {
    fn sign_get(&self, oid: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    fn oid_of(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());

        let data = b"large file content".to_vec();
        let oid = oid_of(&data);

        store.put(&oid, &mut data.as_slice()).await.unwrap();
        assert!(store.exists(&oid).await);

        let (mut file, meta) = store.get(&oid).await.unwrap();
        assert_eq!(meta.len(), data.len() as u64);
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_put_rejects_hash_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());

        let wrong_oid = oid_of(b"something else");
        let err = store
            .put(&wrong_oid, &mut b"actual content".as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(!store.exists(&wrong_oid).await);
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let oid = oid_of(b"never stored");
        assert!(matches!(
            store.get(&oid).await,
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_oid() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        assert!(matches!(
            store.get("../../etc/passwd").await,
            Err(Error::InvalidOid(_))
        ));
    }

    #[tokio::test]
    async fn test_objects_are_sharded_by_prefix() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());

        let data = b"sharded".to_vec();
        let oid = oid_of(&data);
        store.put(&oid, &mut data.as_slice()).await.unwrap();

        assert!(dir.path().join(&oid[..2]).join(&oid).is_file());
    }
}
