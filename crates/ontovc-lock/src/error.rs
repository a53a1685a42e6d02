use ontovc_types::LockId;

use crate::types::{LockScope, LockType};

/// Errors from lock operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder owns a conflicting lock.
    #[error("{branch} ({scope}) is locked for {lock_type} by {holder}")]
    AlreadyLocked {
        branch: String,
        scope: LockScope,
        lock_type: LockType,
        holder: String,
    },

    /// No lock with this id was ever recorded.
    #[error("lock not found: {0}")]
    NotFound(LockId),

    /// The caller does not hold the lock it tried to release.
    #[error("lock {id} is held by {holder}, not {caller}")]
    NotHolder {
        id: LockId,
        holder: String,
        caller: String,
    },

    /// The lock was already released.
    #[error("lock already released: {0}")]
    AlreadyReleased(LockId),

    /// The request itself is malformed.
    #[error("invalid lock request: {0}")]
    InvalidRequest(String),

    /// Filesystem failure in a persistent store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
