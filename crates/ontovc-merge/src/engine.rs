use std::sync::Arc;

use tracing::info;

use ontovc_diff::{diff_snapshots, history};
use ontovc_store::BackingStore;
use ontovc_types::{CommitHash, Document, MergeResult, MergeStrategy, ResourceKind, Snapshot};

use crate::error::MergeError;
use crate::strategy::{executor_for, MergePlan, MergeRequest};

/// Runs merges between branches of one backing store database.
#[derive(Clone)]
pub struct MergeEngine {
    store: Arc<dyn BackingStore>,
    db: String,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn BackingStore>, db: impl Into<String>) -> Self {
        Self {
            store,
            db: db.into(),
        }
    }

    async fn head_of(&self, branch: &str) -> Result<CommitHash, MergeError> {
        self.store
            .get_branch_info(&self.db, branch)
            .await?
            .map(|info| info.head)
            .ok_or_else(|| MergeError::BranchNotFound(branch.to_string()))
    }

    /// Load heads, merge base and snapshots for merging `source` into
    /// `target`.
    pub async fn plan(&self, source_branch: &str, target_branch: &str) -> Result<MergePlan, MergeError> {
        let store = self.store.as_ref();
        let source_head = self.head_of(source_branch).await?;
        let target_head = self.head_of(target_branch).await?;
        let merge_base = history::merge_base(store, &self.db, source_head, target_head).await?;

        let base = match &merge_base {
            Some(hash) => history::snapshot_at(store, &self.db, hash).await?,
            None => Snapshot::new(),
        };
        let source = history::snapshot_at(store, &self.db, &source_head).await?;

        let target_documents = store.commit_documents(&self.db, &target_head).await?;
        let target = Snapshot::from_documents(&target_documents)?;
        let target_extras: Vec<Document> = target_documents
            .into_iter()
            .filter(|d| ResourceKind::from_doc_type(&d.doc_type).is_none())
            .collect();

        Ok(MergePlan {
            db: self.db.clone(),
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            source_head,
            target_head,
            merge_base,
            base,
            source,
            target,
            target_extras,
        })
    }

    /// Returns `true` if the target already contains every source change.
    async fn is_up_to_date(&self, plan: &MergePlan) -> Result<bool, MergeError> {
        if history::is_ancestor(self.store.as_ref(), &self.db, plan.source_head, plan.target_head).await? {
            return Ok(true);
        }
        Ok(diff_snapshots(&plan.base, &plan.source).is_empty())
    }

    /// Merge `source_branch` into `target_branch` with `strategy`.
    ///
    /// Residual conflicts produce an unsuccessful [`MergeResult`] and write
    /// nothing. An up-to-date target succeeds without a new commit.
    pub async fn execute_merge(
        &self,
        source_branch: &str,
        target_branch: &str,
        strategy: MergeStrategy,
        request: &MergeRequest,
    ) -> Result<MergeResult, MergeError> {
        let plan = self.plan(source_branch, target_branch).await?;

        if self.is_up_to_date(&plan).await? {
            info!(
                source = source_branch,
                target = target_branch,
                "target already up to date"
            );
            return Ok(MergeResult::succeeded(strategy, plan.target_head)
                .with_message("already up to date"));
        }

        executor_for(strategy)
            .execute(self.store.as_ref(), &plan, request)
            .await
    }
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine").field("db", &self.db).finish()
    }
}
