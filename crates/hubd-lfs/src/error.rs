//! Error types for hubd-lfs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not an LFS pointer")]
    NotAPointer,

    #[error("invalid LFS pointer: {0}")]
    InvalidPointer(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid repository name: {0}")]
    InvalidRepository(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("hash mismatch for {oid}: content hashed to {actual}")]
    HashMismatch { oid: String, actual: String },

    #[error("lock already created")]
    AlreadyLocked,

    #[error("attempt to delete other user's lock")]
    NotOwner,

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("batch error: {0}")]
    Batch(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
