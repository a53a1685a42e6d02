use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ontovc_types::LockId;

use crate::error::LockResult;
use crate::types::Lock;

/// Durable storage for lock records.
///
/// Implementations must make `insert_if_free` atomic: the check for a
/// blocking lock and the insert happen as one step. Released records are kept
/// for `get` but must stay out of the way of the active set, so the cost of
/// acquiring does not grow with history.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert `lock` unless an active lock blocks it.
    ///
    /// Returns the blocking lock instead of inserting when there is one.
    async fn insert_if_free(&self, lock: &Lock) -> LockResult<Option<Lock>>;

    /// A lock record by id, active or released.
    async fn get(&self, id: &LockId) -> LockResult<Option<Lock>>;

    /// Mark an active lock released and return the updated record.
    async fn mark_released(&self, id: &LockId, by: &str, at: DateTime<Utc>) -> LockResult<Lock>;

    /// Active locks on one branch, oldest first.
    async fn active_for_branch(&self, branch: &str) -> LockResult<Vec<Lock>>;

    /// Every active lock, oldest first.
    async fn all_active(&self) -> LockResult<Vec<Lock>>;

    /// Drop released records released before `before`. Returns how many
    /// were removed. Active locks are never touched.
    async fn prune_released(&self, before: DateTime<Utc>) -> LockResult<usize>;
}
