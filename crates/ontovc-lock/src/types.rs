use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ontovc_types::LockId;

/// The operation a lock protects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    Write,
    Merge,
    Indexing,
    Maintenance,
}

impl LockType {
    /// The state a scope enters while this lock is held.
    pub fn state(&self) -> BranchState {
        match self {
            Self::Write => BranchState::LockedForWrite,
            Self::Merge => BranchState::LockedForMerge,
            Self::Indexing => BranchState::LockedForIndexing,
            Self::Maintenance => BranchState::LockedForMaintenance,
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Write => "WRITE",
            Self::Merge => "MERGE",
            Self::Indexing => "INDEXING",
            Self::Maintenance => "MAINTENANCE",
        };
        f.write_str(s)
    }
}

/// Lock state of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchState {
    Ready,
    LockedForWrite,
    LockedForMerge,
    LockedForIndexing,
    LockedForMaintenance,
}

impl BranchState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::LockedForWrite => "LOCKED_FOR_WRITE",
            Self::LockedForMerge => "LOCKED_FOR_MERGE",
            Self::LockedForIndexing => "LOCKED_FOR_INDEXING",
            Self::LockedForMaintenance => "LOCKED_FOR_MAINTENANCE",
        };
        f.write_str(s)
    }
}

/// What part of a branch a lock covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "resource", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockScope {
    /// The whole branch.
    Branch,
    /// One resource on the branch.
    Resource(String),
}

impl LockScope {
    /// Whether two locks with these scopes on one branch exclude each other.
    pub fn overlaps(&self, other: &LockScope) -> bool {
        match (self, other) {
            (Self::Resource(a), Self::Resource(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => f.write_str("branch"),
            Self::Resource(id) => write!(f, "resource {id}"),
        }
    }
}

/// A lock record. Released records are kept so that a second release can be
/// told apart from a release by the wrong holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    pub branch_name: String,
    pub lock_type: LockType,
    pub lock_scope: LockScope,
    pub locked_by: String,
    pub reason: String,
    pub acquired_at: DateTime<Utc>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_by: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Lock {
    pub fn is_active(&self) -> bool {
        self.released_at.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether this active lock blocks a new lock on `branch` with `scope`.
    pub fn blocks(&self, branch: &str, scope: &LockScope) -> bool {
        self.is_active() && self.branch_name == branch && self.lock_scope.overlaps(scope)
    }
}

/// A request to acquire a lock.
#[derive(Clone, Debug)]
pub struct LockRequest {
    pub branch: String,
    pub lock_type: LockType,
    pub scope: LockScope,
    pub holder: String,
    pub reason: String,
    /// Overrides the manager's default TTL when set.
    pub ttl: Option<Duration>,
}

impl LockRequest {
    /// A branch-scope lock request.
    pub fn new(branch: impl Into<String>, lock_type: LockType, holder: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            lock_type,
            scope: LockScope::Branch,
            holder: holder.into(),
            reason: String::new(),
            ttl: None,
        }
    }

    pub fn with_scope(mut self, scope: LockScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_overlap_rules() {
        let a = LockScope::Resource("ObjectType/A".into());
        let b = LockScope::Resource("ObjectType/B".into());
        assert!(LockScope::Branch.overlaps(&a));
        assert!(a.overlaps(&LockScope::Branch));
        assert!(a.overlaps(&a.clone()));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn lock_type_states() {
        assert_eq!(LockType::Merge.state(), BranchState::LockedForMerge);
        assert_eq!(BranchState::LockedForMaintenance.to_string(), "LOCKED_FOR_MAINTENANCE");
        assert!(BranchState::Ready.is_ready());
    }

    #[test]
    fn scope_serializes_with_tag() {
        let json = serde_json::to_value(LockScope::Resource("x".into())).unwrap();
        assert_eq!(json, serde_json::json!({"scope": "RESOURCE", "resource": "x"}));
        let back: LockScope = serde_json::from_value(serde_json::json!({"scope": "BRANCH"})).unwrap();
        assert_eq!(back, LockScope::Branch);
    }
}
