use tracing::{debug, info};

use ontovc_diff::{BranchDiff, DiffEngine};
use ontovc_events::DomainEvent;
use ontovc_lock::{LockRequest, LockType};
use ontovc_merge::{detect_conflicts, resolve_conflicts, ConflictPolicy, MergeEngine, MergeRequest};
use ontovc_types::{MergeResult, MergeStrategy, ProposalId, ProposalStatus};

use crate::error::{BranchError, BranchResult};
use crate::service::BranchService;

/// Per-call merge settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Merge into a protected target.
    pub allow_protected_target: bool,
    /// Resolution policy for this merge; the configured policy when `None`.
    pub resolution: Option<ConflictPolicy>,
}

impl MergeOptions {
    pub fn allow_protected(mut self) -> Self {
        self.allow_protected_target = true;
        self
    }

    pub fn with_resolution(mut self, policy: ConflictPolicy) -> Self {
        self.resolution = Some(policy);
        self
    }
}

impl BranchService {
    /// Source-relative diff of `source` against `target`, with the conflicts
    /// a merge would have to settle.
    pub async fn get_branch_diff(&self, source: &str, target: &str) -> BranchResult<BranchDiff> {
        let engine = DiffEngine::new(self.store.clone(), self.db());
        let mut diff = engine.compute_diff(source, target).await?;
        diff.conflicts = detect_conflicts(&diff);
        Ok(diff)
    }

    /// Merge `source` into `target` with the configured resolution policy.
    pub async fn merge_branches(
        &self,
        source: &str,
        target: &str,
        strategy: MergeStrategy,
        user: &str,
    ) -> BranchResult<MergeResult> {
        self.merge_branches_with(source, target, strategy, user, MergeOptions::default())
            .await
    }

    /// Merge `source` into `target`.
    ///
    /// Unresolved conflicts come back as an unsuccessful [`MergeResult`] and
    /// nothing is written. Otherwise the target is held under a MERGE lock
    /// while the strategy runs.
    pub async fn merge_branches_with(
        &self,
        source: &str,
        target: &str,
        strategy: MergeStrategy,
        user: &str,
        options: MergeOptions,
    ) -> BranchResult<MergeResult> {
        Self::require_user(user)?;
        if source == target {
            return Err(BranchError::Validation(format!(
                "cannot merge {source} into itself"
            )));
        }
        self.require_branch(source).await?;
        let target_info = self.require_branch(target).await?;

        let diff = self.get_branch_diff(source, target).await?;
        if diff.source_is_unchanged() {
            debug!(source, target, "nothing to merge");
            // Still a completed merge: the target already holds the source.
            let result = MergeResult::succeeded(strategy, diff.target_head).with_message("already up to date");
            self.publish_merge_completed(source, target, &result);
            return Ok(result);
        }

        if self.is_protected(&target_info) && !options.allow_protected_target {
            return Err(BranchError::PolicyViolation(format!(
                "branch {target} is protected; merge through an approved proposal"
            )));
        }

        let policy = options
            .resolution
            .unwrap_or_else(|| self.config.conflict_policy.clone());
        let outcome = resolve_conflicts(diff.conflicts, &policy);
        if !outcome.is_complete() {
            info!(
                source,
                target,
                residual = outcome.residual.len(),
                "merge blocked by conflicts"
            );
            return Ok(MergeResult::conflicted(strategy, outcome.residual).with_resolved(outcome.resolved.len()));
        }

        let engine = MergeEngine::new(self.store.clone(), self.db());
        let request = MergeRequest::new(user, policy);
        let lock = LockRequest::new(target, LockType::Merge, user)
            .with_reason(format!("{strategy} {source} into {target}"));

        let result = self
            .locks
            .with_lock(lock, |_| async {
                engine
                    .execute_merge(source, target, strategy, &request)
                    .await
                    .map_err(BranchError::from)
            })
            .await?;

        if result.success {
            self.invalidate_branch_cache(target).await;
            self.publish_merge_completed(source, target, &result);
        }
        Ok(result)
    }

    fn publish_merge_completed(&self, source: &str, target: &str, result: &MergeResult) {
        self.publish(DomainEvent::MergeCompleted {
            source_branch: source.to_string(),
            target_branch: target.to_string(),
            strategy: result.strategy_used,
            merge_commit_hash: result.merge_commit_hash,
        });
    }

    /// Merge an APPROVED proposal. Approval stands in for the protected
    /// target override. On success the proposal becomes MERGED.
    ///
    /// The proposal stays locked for the whole merge, so it cannot be
    /// rejected while its changes are being applied.
    pub async fn merge_proposal(
        &self,
        id: &ProposalId,
        strategy: MergeStrategy,
        user: &str,
    ) -> BranchResult<MergeResult> {
        Self::require_user(user)?;
        self.with_proposal_lock(id, user, || async {
            let mut proposal = self.require_proposal(id).await?;
            if proposal.status != ProposalStatus::Approved {
                return Err(BranchError::InvalidState(format!(
                    "proposal {id} is {} and cannot be merged",
                    proposal.status
                )));
            }

            let result = self
                .merge_branches_with(
                    &proposal.source_branch,
                    &proposal.target_branch,
                    strategy,
                    user,
                    MergeOptions::default().allow_protected(),
                )
                .await?;

            if result.success {
                Self::transition(&mut proposal, ProposalStatus::Merged)?;
                proposal.merge_commit_hash = result.merge_commit_hash;
                self.save_proposal(&proposal, user).await?;
                info!(proposal = %id, "merged proposal");
            }
            Ok(result)
        })
        .await
    }
}
