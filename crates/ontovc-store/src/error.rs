use ontovc_types::CommitHash;

/// Errors from backing store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A branch with this name already exists.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// The branch does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The referenced commit does not exist.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitHash),

    /// A compare-and-swap head update lost against a concurrent writer.
    #[error("head of {branch} moved: expected {expected}, found {actual}")]
    HeadMoved {
        branch: String,
        expected: CommitHash,
        actual: CommitHash,
    },

    /// The store cannot be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
