use std::fmt;

use ontovc_cache::CacheError;
use ontovc_diff::DiffError;
use ontovc_events::EventError;
use ontovc_lock::LockError;
use ontovc_merge::MergeError;
use ontovc_store::StoreError;
use ontovc_types::TypeError;

/// Category of a [`BranchError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    PolicyViolation,
    InvalidState,
    BackingStore,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PolicyViolation => "policy_violation",
            Self::InvalidState => "invalid_state",
            Self::BackingStore => "backing_store",
        };
        f.write_str(s)
    }
}

/// Errors returned by [`crate::BranchService`].
///
/// Merge conflicts are not errors; see [`ontovc_types::MergeResult`].
#[derive(Debug, thiserror::Error)]
pub enum BranchError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("backing store error: {0}")]
    BackingStore(String),

    /// Lock manager failures keep their type so callers can tell
    /// `NotHolder` from `AlreadyReleased`.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl BranchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::BackingStore(_) => ErrorKind::BackingStore,
            Self::Lock(e) => match e {
                LockError::AlreadyLocked { .. } => ErrorKind::Conflict,
                LockError::NotFound(_) => ErrorKind::NotFound,
                LockError::NotHolder { .. } => ErrorKind::PolicyViolation,
                LockError::AlreadyReleased(_) => ErrorKind::InvalidState,
                LockError::InvalidRequest(_) => ErrorKind::Validation,
                LockError::Io(_) | LockError::Serialization(_) => ErrorKind::BackingStore,
            },
        }
    }

    pub(crate) fn branch_not_found(name: &str) -> Self {
        Self::NotFound {
            what: "branch",
            name: name.to_string(),
        }
    }

    pub(crate) fn proposal_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            what: "proposal",
            name: id.to_string(),
        }
    }
}

impl From<StoreError> for BranchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BranchExists(name) => Self::Conflict(format!("branch already exists: {name}")),
            StoreError::BranchNotFound(name) => Self::branch_not_found(&name),
            e @ StoreError::HeadMoved { .. } => Self::Conflict(e.to_string()),
            e => Self::BackingStore(e.to_string()),
        }
    }
}

impl From<TypeError> for BranchError {
    fn from(e: TypeError) -> Self {
        match e {
            e @ (TypeError::InvalidBranchName { .. } | TypeError::InvalidPattern { .. }) => {
                Self::Validation(e.to_string())
            }
            e => Self::BackingStore(format!("invalid stored document: {e}")),
        }
    }
}

impl From<DiffError> for BranchError {
    fn from(e: DiffError) -> Self {
        match e {
            DiffError::BranchNotFound(name) => Self::branch_not_found(&name),
            DiffError::Store(e) => e.into(),
            e => Self::BackingStore(e.to_string()),
        }
    }
}

impl From<MergeError> for BranchError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::BranchNotFound(name) => Self::branch_not_found(&name),
            MergeError::Store(e) => e.into(),
            MergeError::Diff(e) => e.into(),
            e @ MergeError::InvalidResolution(_) => Self::InvalidState(e.to_string()),
            e => Self::BackingStore(e.to_string()),
        }
    }
}

impl From<CacheError> for BranchError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Store(e) => e.into(),
            e => Self::BackingStore(e.to_string()),
        }
    }
}

impl From<EventError> for BranchError {
    fn from(e: EventError) -> Self {
        Self::BackingStore(e.to_string())
    }
}

impl From<serde_json::Error> for BranchError {
    fn from(e: serde_json::Error) -> Self {
        Self::BackingStore(format!("serialization error: {e}"))
    }
}

pub type BranchResult<T> = Result<T, BranchError>;
