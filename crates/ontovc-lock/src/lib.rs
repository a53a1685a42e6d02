//! Branch lock manager for ontovc.
//!
//! Every (branch, scope) pair follows a small state machine:
//!
//! ```text
//! READY --acquire--> LOCKED_FOR_<TYPE> --release--> READY
//! ```
//!
//! Acquisition is atomic and never queues: of several simultaneous attempts
//! exactly one succeeds and the rest fail with [`LockError::AlreadyLocked`].
//! A `Branch` scope lock excludes every `Resource` lock on the same branch and
//! the other way round.
//!
//! [`LockGuard`] ties a held lock to a scope and releases it on drop.
//!
//! # Backends
//!
//! - [`InMemoryLockStore`] -- `HashMap`-based store for a single process
//! - [`FileLockStore`] -- one JSON record per lock on disk, so held locks
//!   survive a restart

pub mod error;
pub mod file;
pub mod guard;
pub mod manager;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{LockError, LockResult};
pub use file::FileLockStore;
pub use guard::LockGuard;
pub use manager::{LockManager, SWEEPER};
pub use memory::InMemoryLockStore;
pub use traits::LockStore;
pub use types::{BranchState, Lock, LockRequest, LockScope, LockType};
