//! Bare repository access layer for hubd
//!
//! Wraps libgit2 for object access (refs, trees, blobs, commits, config)
//! and shells out to the git transport binaries for wire-level work: the
//! smart-HTTP stateless bridge and shallow mirror fetches. All repository
//! state lives in standard bare layouts on disk.

pub mod blob;
pub mod commit;
pub mod error;
pub mod mirror;
pub mod pktline;
pub mod repo;
pub mod stateless;
pub mod tree;

pub use blob::Blob;
pub use commit::CommitInfo;
pub use error::{Error, Result};
pub use repo::{is_repository, Repository};
pub use stateless::Service;
pub use tree::{HfTreeEntry, HfTreeOptions, LastCommit, TreeEntry};
