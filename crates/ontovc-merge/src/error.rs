//! Error types for the merge crate.

use ontovc_diff::DiffError;
use ontovc_store::StoreError;
use ontovc_types::TypeError;

/// Errors that abort a merge.
///
/// Conflicts are not errors; they are reported through
/// [`ontovc_types::MergeResult`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A branch taking part in the merge does not exist.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Loading history or snapshots failed.
    #[error("diff error: {0}")]
    Diff(DiffError),

    /// A store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A document could not be decoded or encoded as a schema resource.
    #[error("invalid schema document: {0}")]
    InvalidDocument(#[from] TypeError),

    /// A resolution could not be written into the merged snapshot.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),
}

impl From<DiffError> for MergeError {
    fn from(e: DiffError) -> Self {
        match e {
            DiffError::BranchNotFound(name) => MergeError::BranchNotFound(name),
            DiffError::Store(e) => MergeError::Store(e),
            other => MergeError::Diff(other),
        }
    }
}
