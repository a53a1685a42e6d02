use serde::Serialize;

use ontovc_types::{CommitHash, Conflict, ResourceKey};

use crate::snapshot_diff::ChangeSet;

/// Source-relative comparison of two branches.
///
/// `added` holds resources present only on the source, `deleted` those present
/// only on the target, `modified` those present on both with different
/// content. All key lists are sorted.
///
/// The per-side change sets describe what each branch changed since the merge
/// base; conflicts are classified from them and filled in by the conflict
/// resolver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BranchDiff {
    pub source_branch: String,
    pub target_branch: String,
    pub source_head: CommitHash,
    pub target_head: CommitHash,
    pub merge_base: Option<CommitHash>,
    pub added: Vec<ResourceKey>,
    pub modified: Vec<ResourceKey>,
    pub deleted: Vec<ResourceKey>,
    /// `(target identity, source identity)` pairs with identical bodies.
    pub renamed: Vec<(ResourceKey, ResourceKey)>,
    #[serde(skip)]
    pub source_changes: ChangeSet,
    #[serde(skip)]
    pub target_changes: ChangeSet,
    pub conflicts: Vec<Conflict>,
}

impl BranchDiff {
    /// Returns `true` if both branches hold the same schema.
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Returns `true` if the source changed nothing since the merge base.
    pub fn source_is_unchanged(&self) -> bool {
        self.source_changes.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}
