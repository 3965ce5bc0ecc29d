//! hubd: a self-hosted git server with LFS and a model-hub compatible API
//!
//! The binary wires three surfaces over one repository root: the smart-HTTP
//! transport used by git clients, the git-LFS batch/locking API, and a
//! model-hub read API for machine-learning clients. Repositories can also
//! be imported from a remote and kept in sync as read-only mirrors.

pub mod config;
pub mod importer;
pub mod paths;
pub mod queue;
pub mod repo_locks;
pub mod server;

pub use importer::Importer;
pub use queue::{Task, TaskKind, TaskPriority, TaskQueue, TaskStatus};
pub use repo_locks::RepoWriteLocks;
pub use server::{AppState, HubServer};
