//! Merge strategy implementors.
//!
//! Each strategy writes detached commits and then moves the target branch
//! with a single compare-and-swap. Until that final step nothing is visible
//! on any branch, so a failure at any point leaves the target head exactly
//! where it was.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ontovc_diff::history;
use ontovc_store::{BackingStore, NewCommit};
use ontovc_types::{CommitHash, Conflict, Document, MergeResult, MergeStrategy, Snapshot};

use crate::error::MergeError;
use crate::resolver::{apply_resolutions, resolve_conflicts, ConflictPolicy};
use crate::three_way::merge_snapshots;

/// Everything a strategy needs, loaded once before it runs.
#[derive(Clone, Debug)]
pub struct MergePlan {
    pub db: String,
    pub source_branch: String,
    pub target_branch: String,
    pub source_head: CommitHash,
    pub target_head: CommitHash,
    pub merge_base: Option<CommitHash>,
    pub base: Snapshot,
    pub source: Snapshot,
    pub target: Snapshot,
    /// Non-schema documents at the target head; carried into every commit.
    pub target_extras: Vec<Document>,
}

/// Who merges, and how conflicts may be cleared.
#[derive(Clone, Debug, Default)]
pub struct MergeRequest {
    pub author: String,
    pub policy: ConflictPolicy,
}

impl MergeRequest {
    pub fn new(author: impl Into<String>, policy: ConflictPolicy) -> Self {
        Self {
            author: author.into(),
            policy,
        }
    }
}

/// A way of bringing source changes into the target.
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    fn strategy(&self) -> MergeStrategy;

    /// Run the strategy. Returns a blocked [`MergeResult`] on residual
    /// conflicts and an error on store failure; in both cases the target
    /// head is unchanged.
    async fn execute(
        &self,
        store: &dyn BackingStore,
        plan: &MergePlan,
        request: &MergeRequest,
    ) -> Result<MergeResult, MergeError>;
}

/// The executor for `strategy`.
pub fn executor_for(strategy: MergeStrategy) -> Box<dyn StrategyExecutor> {
    match strategy {
        MergeStrategy::Merge => Box::new(ThreeWayMerge),
        MergeStrategy::Squash => Box::new(SquashMerge),
        MergeStrategy::Rebase => Box::new(RebaseMerge),
    }
}

enum Settled {
    Clean { snapshot: Snapshot, resolved: usize },
    Blocked { residual: Vec<Conflict>, resolved: usize },
}

/// Merge three snapshots and clear what the policy allows.
fn settle(
    base: &Snapshot,
    source: &Snapshot,
    target: &Snapshot,
    policy: &ConflictPolicy,
) -> Result<Settled, MergeError> {
    let mut result = merge_snapshots(base, source, target);
    let outcome = resolve_conflicts(std::mem::take(&mut result.conflicts), policy);
    let resolved = outcome.resolved.len();
    if !outcome.is_complete() {
        return Ok(Settled::Blocked {
            residual: outcome.residual,
            resolved,
        });
    }
    apply_resolutions(&mut result.merged, source, &outcome.resolved)?;
    Ok(Settled::Clean {
        snapshot: result.merged,
        resolved,
    })
}

fn commit_contents(snapshot: &Snapshot, extras: &[Document]) -> Result<Vec<Document>, MergeError> {
    let mut documents = snapshot.to_documents()?;
    documents.extend(extras.iter().cloned());
    Ok(documents)
}

async fn publish(store: &dyn BackingStore, plan: &MergePlan, new_head: CommitHash) -> Result<(), MergeError> {
    store
        .update_branch_head(&plan.db, &plan.target_branch, plan.target_head, new_head)
        .await?;
    Ok(())
}

/// Three-way merge producing a commit with two parents.
#[derive(Debug, Default)]
pub struct ThreeWayMerge;

#[async_trait]
impl StrategyExecutor for ThreeWayMerge {
    fn strategy(&self) -> MergeStrategy {
        MergeStrategy::Merge
    }

    async fn execute(
        &self,
        store: &dyn BackingStore,
        plan: &MergePlan,
        request: &MergeRequest,
    ) -> Result<MergeResult, MergeError> {
        let (snapshot, resolved) = match settle(&plan.base, &plan.source, &plan.target, &request.policy)? {
            Settled::Clean { snapshot, resolved } => (snapshot, resolved),
            Settled::Blocked { residual, resolved } => {
                return Ok(MergeResult::conflicted(self.strategy(), residual).with_resolved(resolved));
            }
        };

        let commit = NewCommit::new(
            vec![plan.target_head, plan.source_head],
            commit_contents(&snapshot, &plan.target_extras)?,
            format!("Merge branch '{}' into '{}'", plan.source_branch, plan.target_branch),
            request.author.clone(),
        );
        let hash = store.write_commit(&plan.db, commit).await?;
        publish(store, plan, hash).await?;

        info!(
            source = %plan.source_branch,
            target = %plan.target_branch,
            commit = %hash.short_hex(),
            resolved,
            "merged branches"
        );
        Ok(MergeResult::succeeded(self.strategy(), hash).with_resolved(resolved))
    }
}

/// All source changes since divergence as one single-parent commit.
#[derive(Debug, Default)]
pub struct SquashMerge;

#[async_trait]
impl StrategyExecutor for SquashMerge {
    fn strategy(&self) -> MergeStrategy {
        MergeStrategy::Squash
    }

    async fn execute(
        &self,
        store: &dyn BackingStore,
        plan: &MergePlan,
        request: &MergeRequest,
    ) -> Result<MergeResult, MergeError> {
        let (snapshot, resolved) = match settle(&plan.base, &plan.source, &plan.target, &request.policy)? {
            Settled::Clean { snapshot, resolved } => (snapshot, resolved),
            Settled::Blocked { residual, resolved } => {
                return Ok(MergeResult::conflicted(self.strategy(), residual).with_resolved(resolved));
            }
        };

        let squashed = history::commits_since(store, &plan.db, plan.source_head, plan.target_head).await?;
        let commit = NewCommit::new(
            vec![plan.target_head],
            commit_contents(&snapshot, &plan.target_extras)?,
            format!(
                "Squash {} commit(s) from '{}' into '{}'",
                squashed.len(),
                plan.source_branch,
                plan.target_branch
            ),
            request.author.clone(),
        );
        let hash = store.write_commit(&plan.db, commit).await?;
        publish(store, plan, hash).await?;

        info!(
            source = %plan.source_branch,
            target = %plan.target_branch,
            commit = %hash.short_hex(),
            squashed = squashed.len(),
            "squash-merged branches"
        );
        Ok(MergeResult::succeeded(self.strategy(), hash).with_resolved(resolved))
    }
}

/// Source commits replayed one by one onto the target head.
#[derive(Debug, Default)]
pub struct RebaseMerge;

#[async_trait]
impl StrategyExecutor for RebaseMerge {
    fn strategy(&self) -> MergeStrategy {
        MergeStrategy::Rebase
    }

    async fn execute(
        &self,
        store: &dyn BackingStore,
        plan: &MergePlan,
        request: &MergeRequest,
    ) -> Result<MergeResult, MergeError> {
        let commits = history::commits_since(store, &plan.db, plan.source_head, plan.target_head).await?;
        let total = commits.len();

        let mut tip = plan.target_head;
        let mut tip_snapshot = plan.target.clone();
        let mut resolved_total = 0;

        for (index, commit) in commits.iter().enumerate() {
            let parent_snapshot = match commit.first_parent() {
                Some(parent) => history::snapshot_at(store, &plan.db, &parent).await?,
                None => Snapshot::new(),
            };
            let commit_snapshot = history::snapshot_at(store, &plan.db, &commit.hash).await?;

            let snapshot = match settle(&parent_snapshot, &commit_snapshot, &tip_snapshot, &request.policy)? {
                Settled::Clean { snapshot, resolved } => {
                    resolved_total += resolved;
                    snapshot
                }
                Settled::Blocked { residual, resolved } => {
                    warn!(
                        source = %plan.source_branch,
                        target = %plan.target_branch,
                        step = index + 1,
                        total,
                        "rebase stopped on conflicts"
                    );
                    return Ok(MergeResult::conflicted(self.strategy(), residual)
                        .with_resolved(resolved_total + resolved)
                        .with_message(format!(
                            "rebase stopped at commit {} of {}",
                            index + 1,
                            total
                        )));
                }
            };

            let replayed = NewCommit::new(
                vec![tip],
                commit_contents(&snapshot, &plan.target_extras)?,
                commit.message.clone(),
                commit.author.clone(),
            );
            tip = store.write_commit(&plan.db, replayed).await?;
            tip_snapshot = snapshot;
            debug!(step = index + 1, total, commit = %tip.short_hex(), "replayed commit");
        }

        publish(store, plan, tip).await?;
        info!(
            source = %plan.source_branch,
            target = %plan.target_branch,
            replayed = total,
            head = %tip.short_hex(),
            "rebased branch"
        );
        Ok(MergeResult::succeeded(self.strategy(), tip).with_resolved(resolved_total))
    }
}
