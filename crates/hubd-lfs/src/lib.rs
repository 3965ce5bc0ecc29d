//! Git LFS subsystem for hubd
//!
//! Covers the pieces of LFS the server needs: pointer decoding, a
//! content-addressed object store, the advisory file-lock store behind the
//! locking API, and the batch-download client used when importing mirrors.

pub mod content;
pub mod error;
pub mod locks;
pub mod pointer;
pub mod remote;

pub use content::{ContentStore, SignedUrlStore};
pub use error::{Error, Result};
pub use locks::{Lock, LockStore, Owner};
pub use pointer::{Pointer, MAX_POINTER_SIZE};
pub use remote::{LfsObject, RemoteClient};
