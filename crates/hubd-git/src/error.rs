//! Error types for hubd-git

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("repository does not exist")]
    RepositoryNotExists,

    #[error("repository already exists")]
    RepositoryExists,

    #[error("failed to resolve reference: not a valid branch or commit SHA")]
    RefNotFound(String),

    #[error("path not found in tree: {0}")]
    PathNotFound(String),

    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
