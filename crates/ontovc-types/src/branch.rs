use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::CommitHash;

/// Document type under which branch metadata is stored.
pub const BRANCH_METADATA_DOC_TYPE: &str = "BranchMetadata";

/// Branch metadata record.
///
/// `head_hash` is a copy taken when the record was read; the backing store
/// remains authoritative for the actual head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_branch: Option<String>,
    pub head_hash: CommitHash,
    pub is_protected: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Branch {
    /// A fresh metadata record for a newly created branch.
    pub fn new(
        name: impl Into<String>,
        parent_branch: Option<String>,
        head_hash: CommitHash,
        author: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let author = author.into();
        let now = Utc::now();
        Self {
            id: Self::metadata_id(&name),
            display_name: name.clone(),
            name,
            description: None,
            parent_branch,
            head_hash,
            is_protected: false,
            created_by: author.clone(),
            created_at: now,
            modified_by: author,
            modified_at: now,
            is_active: true,
        }
    }

    /// Document id of the metadata record for `name`.
    pub fn metadata_id(name: &str) -> String {
        format!("{BRANCH_METADATA_DOC_TYPE}/{name}")
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}
