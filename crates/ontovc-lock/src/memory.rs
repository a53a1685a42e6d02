use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use ontovc_types::LockId;

use crate::error::{LockError, LockResult};
use crate::traits::LockStore;
use crate::types::Lock;

#[derive(Debug, Default)]
struct Records {
    active: HashMap<LockId, Lock>,
    released: HashMap<LockId, Lock>,
}

/// In-memory lock store.
///
/// A single mutex guards every record, which makes the check-and-insert in
/// [`LockStore::insert_if_free`] atomic. Released records move to a separate
/// map that only `get` and pruning look at.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    records: Mutex<Records>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of released records still kept.
    pub async fn released_count(&self) -> usize {
        self.records.lock().await.released.len()
    }
}

pub(crate) fn sort_oldest_first(mut locks: Vec<Lock>) -> Vec<Lock> {
    locks.sort_by(|a, b| a.acquired_at.cmp(&b.acquired_at).then_with(|| a.id.cmp(&b.id)));
    locks
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn insert_if_free(&self, lock: &Lock) -> LockResult<Option<Lock>> {
        let mut records = self.records.lock().await;
        if let Some(blocking) = records
            .active
            .values()
            .find(|existing| existing.blocks(&lock.branch_name, &lock.lock_scope))
        {
            return Ok(Some(blocking.clone()));
        }
        records.active.insert(lock.id.clone(), lock.clone());
        Ok(None)
    }

    async fn get(&self, id: &LockId) -> LockResult<Option<Lock>> {
        let records = self.records.lock().await;
        Ok(records
            .active
            .get(id)
            .or_else(|| records.released.get(id))
            .cloned())
    }

    async fn mark_released(&self, id: &LockId, by: &str, at: DateTime<Utc>) -> LockResult<Lock> {
        let mut records = self.records.lock().await;
        let Some(mut lock) = records.active.remove(id) else {
            return Err(if records.released.contains_key(id) {
                LockError::AlreadyReleased(id.clone())
            } else {
                LockError::NotFound(id.clone())
            });
        };
        lock.released_at = Some(at);
        lock.released_by = Some(by.to_string());
        records.released.insert(id.clone(), lock.clone());
        Ok(lock)
    }

    async fn active_for_branch(&self, branch: &str) -> LockResult<Vec<Lock>> {
        let records = self.records.lock().await;
        Ok(sort_oldest_first(
            records
                .active
                .values()
                .filter(|l| l.branch_name == branch)
                .cloned()
                .collect(),
        ))
    }

    async fn all_active(&self) -> LockResult<Vec<Lock>> {
        let records = self.records.lock().await;
        Ok(sort_oldest_first(records.active.values().cloned().collect()))
    }

    async fn prune_released(&self, before: DateTime<Utc>) -> LockResult<usize> {
        let mut records = self.records.lock().await;
        let kept = records.released.len();
        records
            .released
            .retain(|_, l| l.released_at.map_or(true, |at| at >= before));
        Ok(kept - records.released.len())
    }
}
