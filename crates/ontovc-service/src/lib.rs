//! Branch service for ontovc.
//!
//! [`BranchService`] is the public surface of the engine. It validates and
//! authorizes requests, then orchestrates the backing store, cache, lock
//! manager, diff and merge engines and event publisher:
//!
//! - branch lifecycle: create, delete, get, list
//! - diffs between branches with conflict detection
//! - change proposals: create, submit, approve, reject, merge
//! - merges with the MERGE, SQUASH and REBASE strategies
//! - branch locks
//!
//! Validation and policy checks run before any mutation. Merge conflicts are
//! reported as data in [`ontovc_types::MergeResult`], never as errors.

pub mod config;
pub mod error;
pub mod locking;
pub mod merging;
pub mod proposals;
pub mod service;

pub use config::{CacheConfig, ConfigError, LockConfig, ServiceConfig};
pub use error::{BranchError, BranchResult, ErrorKind};
pub use merging::MergeOptions;
pub use service::{BranchService, SYSTEM_USER};
