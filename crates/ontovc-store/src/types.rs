use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ontovc_types::{CommitHash, Document};

/// Store-native information about a branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBranchInfo {
    pub name: String,
    pub head: CommitHash,
    pub parent: Option<String>,
    pub protected: bool,
}

/// Metadata of a stored commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: CommitHash,
    /// First parent is the branch the commit was made on.
    pub parents: Vec<CommitHash>,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    pub fn first_parent(&self) -> Option<CommitHash> {
        self.parents.first().copied()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// A commit to be written: the full document set plus lineage.
#[derive(Clone, Debug)]
pub struct NewCommit {
    pub parents: Vec<CommitHash>,
    pub documents: Vec<Document>,
    pub message: String,
    pub author: String,
}

impl NewCommit {
    pub fn new(
        parents: Vec<CommitHash>,
        documents: Vec<Document>,
        message: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            parents,
            documents,
            message: message.into(),
            author: author.into(),
        }
    }
}
