//! Error types for the diff crate.

use ontovc_types::{CommitHash, TypeError};

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A branch named in the diff does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// A commit referenced during a history walk was not found.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitHash),

    /// A stored document could not be decoded as a schema resource.
    #[error("invalid schema document: {0}")]
    InvalidDocument(#[from] TypeError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] ontovc_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
