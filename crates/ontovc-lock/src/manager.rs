use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use ontovc_types::LockId;

use crate::error::{LockError, LockResult};
use crate::guard::LockGuard;
use crate::traits::LockStore;
use crate::types::{BranchState, Lock, LockRequest, LockScope};

/// Holder name recorded when the TTL sweep releases a lock.
pub const SWEEPER: &str = "system:lock-sweeper";

/// Acquires, releases and reports branch locks over a [`LockStore`].
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    default_ttl: Option<Duration>,
}

impl LockManager {
    /// `default_ttl` applies to requests that carry no TTL of their own.
    pub fn new(store: Arc<dyn LockStore>, default_ttl: Option<Duration>) -> Self {
        Self { store, default_ttl }
    }

    /// Take a lock, failing at once if a conflicting lock is held.
    pub async fn acquire(&self, request: LockRequest) -> LockResult<Lock> {
        if request.branch.trim().is_empty() {
            return Err(LockError::InvalidRequest("branch name is empty".into()));
        }
        if request.holder.trim().is_empty() {
            return Err(LockError::InvalidRequest("holder is empty".into()));
        }
        if matches!(&request.scope, LockScope::Resource(id) if id.is_empty()) {
            return Err(LockError::InvalidRequest("resource id is empty".into()));
        }

        let now = Utc::now();
        let expires_at = match request.ttl.or(self.default_ttl) {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| LockError::InvalidRequest(format!("ttl out of range: {e}")))?;
                Some(now + ttl)
            }
            None => None,
        };

        let lock = Lock {
            id: LockId::new(),
            branch_name: request.branch,
            lock_type: request.lock_type,
            lock_scope: request.scope,
            locked_by: request.holder,
            reason: request.reason,
            acquired_at: now,
            released_at: None,
            released_by: None,
            expires_at,
        };

        if let Some(blocking) = self.store.insert_if_free(&lock).await? {
            debug!(
                branch = %lock.branch_name,
                scope = %lock.lock_scope,
                holder = %blocking.locked_by,
                "lock acquisition refused"
            );
            return Err(LockError::AlreadyLocked {
                branch: blocking.branch_name,
                scope: blocking.lock_scope,
                lock_type: blocking.lock_type,
                holder: blocking.locked_by,
            });
        }

        info!(
            lock = %lock.id,
            branch = %lock.branch_name,
            scope = %lock.lock_scope,
            lock_type = %lock.lock_type,
            holder = %lock.locked_by,
            "acquired lock"
        );
        Ok(lock)
    }

    /// Release a lock held by `holder`.
    pub async fn release(&self, id: &LockId, holder: &str) -> LockResult<Lock> {
        let lock = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| LockError::NotFound(id.clone()))?;
        if !lock.is_active() {
            return Err(LockError::AlreadyReleased(id.clone()));
        }
        if lock.locked_by != holder {
            return Err(LockError::NotHolder {
                id: id.clone(),
                holder: lock.locked_by,
                caller: holder.to_string(),
            });
        }

        let released = self.store.mark_released(id, holder, Utc::now()).await?;
        info!(lock = %id, branch = %released.branch_name, holder, "released lock");
        Ok(released)
    }

    /// Operator path: release a lock regardless of who holds it.
    pub async fn force_release(&self, id: &LockId, operator: &str) -> LockResult<Lock> {
        let released = self.store.mark_released(id, operator, Utc::now()).await?;
        warn!(
            lock = %id,
            branch = %released.branch_name,
            holder = %released.locked_by,
            operator,
            "force-released lock"
        );
        Ok(released)
    }

    /// The lock record with this id, active or released.
    pub async fn get_lock_status(&self, id: &LockId) -> LockResult<Option<Lock>> {
        self.store.get(id).await
    }

    /// Active locks on `branch`, oldest first.
    pub async fn active_locks(&self, branch: &str) -> LockResult<Vec<Lock>> {
        self.store.active_for_branch(branch).await
    }

    /// Every active lock, oldest first.
    pub async fn all_active(&self) -> LockResult<Vec<Lock>> {
        self.store.all_active().await
    }

    /// State of `branch`: the state of its branch-scope lock if one is held,
    /// else of its oldest resource lock, else `Ready`.
    pub async fn get_branch_state(&self, branch: &str) -> LockResult<BranchState> {
        let locks = self.store.active_for_branch(branch).await?;
        let lock = locks
            .iter()
            .find(|l| l.lock_scope == LockScope::Branch)
            .or_else(|| locks.first());
        Ok(lock.map_or(BranchState::Ready, |l| l.lock_type.state()))
    }

    /// State of one (branch, scope) pair.
    pub async fn get_scope_state(&self, branch: &str, scope: &LockScope) -> LockResult<BranchState> {
        let locks = self.store.active_for_branch(branch).await?;
        Ok(locks
            .iter()
            .find(|l| &l.lock_scope == scope)
            .map_or(BranchState::Ready, |l| l.lock_type.state()))
    }

    /// Release every lock whose TTL has passed. Returns the released records.
    pub async fn sweep_expired(&self) -> LockResult<Vec<Lock>> {
        let now = Utc::now();
        let mut released = Vec::new();
        for lock in self.store.all_active().await? {
            if !lock.is_expired(now) {
                continue;
            }
            match self.store.mark_released(&lock.id, SWEEPER, now).await {
                Ok(record) => {
                    warn!(
                        lock = %record.id,
                        branch = %record.branch_name,
                        holder = %record.locked_by,
                        expired_at = ?record.expires_at,
                        "released expired lock"
                    );
                    released.push(record);
                }
                // Released concurrently by its holder.
                Err(LockError::AlreadyReleased(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(released)
    }

    /// Forget released records older than `retention`.
    pub async fn prune_released(&self, retention: Duration) -> LockResult<usize> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| LockError::InvalidRequest(format!("retention out of range: {e}")))?;
        let pruned = self.store.prune_released(Utc::now() - retention).await?;
        if pruned > 0 {
            info!(pruned, "pruned released lock records");
        }
        Ok(pruned)
    }

    /// Take a lock owned by a [`LockGuard`], which releases it on drop.
    pub async fn acquire_guard(&self, request: LockRequest) -> LockResult<LockGuard> {
        let lock = self.acquire(request).await?;
        Ok(LockGuard::new(self.clone(), lock))
    }

    /// Run `f` while holding the requested lock and release it afterwards.
    ///
    /// The lock is released on every exit path: success, error, a panic in
    /// `f`, or the returned future being dropped early. A release failure
    /// after `f` succeeded is returned; after `f` failed it is logged and
    /// `f`'s error wins.
    pub async fn with_lock<T, E, F, Fut>(&self, request: LockRequest, f: F) -> Result<T, E>
    where
        F: FnOnce(Lock) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.acquire_guard(request).await?;
        let id = guard.id().clone();

        let outcome = f(guard.lock().clone()).await;
        let release = guard.release().await;

        match (outcome, release) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(release_error)) => {
                warn!(lock = %id, error = %release_error, "failed to release lock after error");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
