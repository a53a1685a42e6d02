//! Scoped lock ownership.
//!
//! A [`LockGuard`] releases its lock when dropped, so a lock taken around an
//! async section is returned even if the section is cancelled or panics.
//! Dropping needs a tokio runtime to run the release on; outside one the
//! lock stays held until swept or force-released.

use tracing::warn;

use ontovc_types::LockId;

use crate::error::LockResult;
use crate::manager::LockManager;
use crate::types::Lock;

/// An acquired lock that is released on drop unless released explicitly.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    manager: LockManager,
    lock: Lock,
    armed: bool,
}

impl LockGuard {
    pub(crate) fn new(manager: LockManager, lock: Lock) -> Self {
        Self {
            manager,
            lock,
            armed: true,
        }
    }

    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    pub fn id(&self) -> &LockId {
        &self.lock.id
    }

    /// Release now and report the outcome.
    pub async fn release(mut self) -> LockResult<Lock> {
        self.armed = false;
        self.manager.release(&self.lock.id, &self.lock.locked_by).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.lock.id.clone();
        let holder = self.lock.locked_by.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(lock = %id, holder = %holder, "lock guard dropped outside a runtime, lock stays held");
            return;
        };

        warn!(lock = %id, branch = %self.lock.branch_name, holder = %holder, "lock guard dropped while held");
        let manager = self.manager.clone();
        handle.spawn(async move {
            if let Err(e) = manager.release(&id, &holder).await {
                warn!(lock = %id, error = %e, "failed to release dropped lock guard");
            }
        });
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.lock.id)
            .field("armed", &self.armed)
            .finish()
    }
}
