use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::conflict::Conflict;
use crate::hash::CommitHash;

/// How a source branch's changes are brought into a target branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Three-way merge producing a commit with two parents.
    #[default]
    Merge,
    /// All source changes since divergence collapsed into one commit.
    Squash,
    /// Source commits replayed one by one onto the target head.
    Rebase,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Merge => "merge",
            Self::Squash => "squash",
            Self::Rebase => "rebase",
        };
        f.write_str(s)
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            "rebase" => Ok(Self::Rebase),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// The outcome of a merge attempt.
///
/// Conflicts are an expected business outcome, so they are reported here as
/// data (`success == false`) rather than as an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub merge_commit_hash: Option<CommitHash>,
    pub conflicts: Vec<Conflict>,
    pub strategy_used: MergeStrategy,
    /// Number of conflicts cleared by an auto-resolution policy.
    #[serde(default)]
    pub resolved_conflicts: usize,
    #[serde(default)]
    pub message: Option<String>,
}

impl MergeResult {
    /// A successful merge that left the target at `commit`.
    pub fn succeeded(strategy: MergeStrategy, commit: CommitHash) -> Self {
        Self {
            success: true,
            merge_commit_hash: Some(commit),
            conflicts: Vec::new(),
            strategy_used: strategy,
            resolved_conflicts: 0,
            message: None,
        }
    }

    /// A blocked merge with residual conflicts; nothing was written.
    pub fn conflicted(strategy: MergeStrategy, conflicts: Vec<Conflict>) -> Self {
        Self {
            success: false,
            merge_commit_hash: None,
            conflicts,
            strategy_used: strategy,
            resolved_conflicts: 0,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_resolved(mut self, resolved: usize) -> Self {
        self.resolved_conflicts = resolved;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parse() {
        assert_eq!("SQUASH".parse::<MergeStrategy>(), Ok(MergeStrategy::Squash));
        assert_eq!("rebase".parse::<MergeStrategy>(), Ok(MergeStrategy::Rebase));
        assert!("octopus".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::default(), MergeStrategy::Merge);
    }

    #[test]
    fn conflicted_result_has_no_commit() {
        let result = MergeResult::conflicted(MergeStrategy::Merge, Vec::new());
        assert!(!result.success);
        assert!(result.merge_commit_hash.is_none());
    }
}
