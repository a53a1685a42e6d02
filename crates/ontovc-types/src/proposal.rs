use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::CommitHash;
use crate::ids::ProposalId;

/// Document type under which change proposals are stored.
pub const PROPOSAL_DOC_TYPE: &str = "ChangeProposal";

/// Review status of a change proposal.
///
/// Transitions are monotonic: `Draft -> Review -> Approved -> Merged`, with
/// `Rejected` reachable from `Draft` or `Review`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Draft,
    Review,
    Approved,
    Merged,
    Rejected,
}

impl ProposalStatus {
    /// Returns `true` while the proposal is awaiting a review decision.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Draft | Self::Review)
    }

    /// Returns `true` if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Draft, Review)
                | (Draft, Approved)
                | (Review, Approved)
                | (Draft, Rejected)
                | (Review, Rejected)
                | (Approved, Merged)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Review => "REVIEW",
            Self::Approved => "APPROVED",
            Self::Merged => "MERGED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// A reviewable request to merge one branch's changes into another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub id: ProposalId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_branch: String,
    pub target_branch: String,
    pub status: ProposalStatus,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub merge_commit_hash: Option<CommitHash>,
}

impl ChangeProposal {
    /// A new proposal in `Draft` status.
    pub fn new(
        title: impl Into<String>,
        description: Option<String>,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProposalId::new(),
            title: title.into(),
            description,
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
            status: ProposalStatus::Draft,
            author: author.into(),
            created_at: now,
            updated_at: now,
            reviewed_by: None,
            rejection_reason: None,
            merge_commit_hash: None,
        }
    }

    /// Document id of the stored proposal.
    pub fn document_id(id: &ProposalId) -> String {
        format!("{PROPOSAL_DOC_TYPE}/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_statuses() {
        assert!(ProposalStatus::Draft.is_pending());
        assert!(ProposalStatus::Review.is_pending());
        assert!(!ProposalStatus::Approved.is_pending());
        assert!(!ProposalStatus::Merged.is_pending());
        assert!(!ProposalStatus::Rejected.is_pending());
    }

    #[test]
    fn transitions_are_monotonic() {
        use ProposalStatus::*;
        assert!(Draft.can_transition_to(Review));
        assert!(Review.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Merged));
        assert!(Review.can_transition_to(Rejected));

        assert!(!Review.can_transition_to(Draft));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Merged.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Review));
        assert!(!Draft.can_transition_to(Merged));
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&ProposalStatus::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
    }

    #[test]
    fn new_proposal_is_draft() {
        let p = ChangeProposal::new("Add price", None, "feature/price", "main", "alice");
        assert_eq!(p.status, ProposalStatus::Draft);
        assert!(ChangeProposal::document_id(&p.id).starts_with("ChangeProposal/"));
    }
}
