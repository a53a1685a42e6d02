use ontovc_lock::{BranchState, Lock, LockRequest};
use ontovc_types::LockId;

use crate::error::BranchResult;
use crate::service::BranchService;

impl BranchService {
    /// Lock a branch, or one resource on it. Fails at once if a conflicting
    /// lock is held.
    pub async fn acquire_lock(&self, request: LockRequest) -> BranchResult<Lock> {
        Self::require_user(&request.holder)?;
        self.require_branch(&request.branch).await?;
        Ok(self.locks.acquire(request).await?)
    }

    pub async fn release_lock(&self, id: &LockId, user: &str) -> BranchResult<Lock> {
        Ok(self.locks.release(id, user).await?)
    }

    /// Operator path for locks whose holder has gone away.
    pub async fn force_release_lock(&self, id: &LockId, operator: &str) -> BranchResult<Lock> {
        Self::require_user(operator)?;
        Ok(self.locks.force_release(id, operator).await?)
    }

    pub async fn get_lock_status(&self, id: &LockId) -> BranchResult<Option<Lock>> {
        Ok(self.locks.get_lock_status(id).await?)
    }

    /// Lock state of `branch`, or `None` if the branch does not exist.
    pub async fn get_branch_state(&self, branch: &str) -> BranchResult<Option<BranchState>> {
        if self.store.get_branch_info(self.db(), branch).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.locks.get_branch_state(branch).await?))
    }

    /// Release every lock past its TTL, then drop released records older
    /// than the configured retention.
    pub async fn sweep_expired_locks(&self) -> BranchResult<Vec<Lock>> {
        let released = self.locks.sweep_expired().await?;
        if let Some(retention) = self.config.locks.released_retention() {
            self.locks.prune_released(retention).await?;
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::{BranchError, ErrorKind};
    use crate::service::test_support::Harness;
    use ontovc_lock::{LockError, LockType};

    #[tokio::test]
    async fn concurrent_acquire_has_one_winner() {
        let h = Arc::new(Harness::new().await);
        let mut handles = Vec::new();
        for i in 0..10 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.service
                    .acquire_lock(LockRequest::new("main", LockType::Write, format!("worker-{i}")))
                    .await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(lock) => winners.push(lock),
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(
            h.service.get_branch_state("main").await.unwrap(),
            Some(BranchState::LockedForWrite)
        );

        let lock = &winners[0];
        h.service.release_lock(&lock.id, &lock.locked_by).await.unwrap();
        assert_eq!(h.service.get_branch_state("main").await.unwrap(), Some(BranchState::Ready));
        assert!(h
            .service
            .acquire_lock(LockRequest::new("main", LockType::Write, "late"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn release_by_other_user_and_double_release_differ() {
        let h = Harness::new().await;
        let lock = h
            .service
            .acquire_lock(LockRequest::new("main", LockType::Indexing, "indexer").with_reason("reindex"))
            .await
            .unwrap();

        let err = h.service.release_lock(&lock.id, "alice").await.unwrap_err();
        assert!(matches!(err, BranchError::Lock(LockError::NotHolder { .. })));

        h.service.release_lock(&lock.id, "indexer").await.unwrap();
        let err = h.service.release_lock(&lock.id, "indexer").await.unwrap_err();
        assert!(matches!(err, BranchError::Lock(LockError::AlreadyReleased(_))));

        let status = h.service.get_lock_status(&lock.id).await.unwrap().unwrap();
        assert_eq!(status.reason, "reindex");
        assert_eq!(status.released_by.as_deref(), Some("indexer"));
    }

    #[tokio::test]
    async fn locks_need_an_existing_branch() {
        let h = Harness::new().await;
        let err = h
            .service
            .acquire_lock(LockRequest::new("ghost", LockType::Write, "alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.service.get_branch_state("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn locked_branch_cannot_be_deleted_until_force_released() {
        let h = Harness::new().await;
        h.service.create_branch("feature/x", None, None, "alice").await.unwrap();
        let lock = h
            .service
            .acquire_lock(LockRequest::new("feature/x", LockType::Write, "crashed"))
            .await
            .unwrap();

        let err = h.service.delete_branch("feature/x", "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        h.service.force_release_lock(&lock.id, "ops").await.unwrap();
        assert!(h.service.delete_branch("feature/x", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_prunes_released_records_past_retention() {
        let mut config = crate::config::ServiceConfig::default();
        config.locks.released_retention_secs = Some(0);
        let h = Harness::with_config(config).await;

        let lock = h
            .service
            .acquire_lock(LockRequest::new("main", LockType::Write, "alice"))
            .await
            .unwrap();
        h.service.release_lock(&lock.id, "alice").await.unwrap();
        assert!(h.service.get_lock_status(&lock.id).await.unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(h.service.sweep_expired_locks().await.unwrap().is_empty());
        assert!(h.service.get_lock_status(&lock.id).await.unwrap().is_none());
    }
}
