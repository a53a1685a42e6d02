use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ontovc_types::{CommitHash, MergeStrategy, ProposalId};

use crate::error::EventResult;

/// An event as handed to a sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Events produced by branch and proposal operations.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    BranchCreated {
        branch_name: String,
        parent_branch: String,
        author: String,
        description: Option<String>,
    },
    BranchDeleted {
        branch_name: String,
        author: String,
    },
    ProposalCreated {
        proposal_id: ProposalId,
        source_branch: String,
        target_branch: String,
        author: String,
    },
    ProposalApproved {
        proposal_id: ProposalId,
        by: String,
    },
    ProposalRejected {
        proposal_id: ProposalId,
        by: String,
        reason: Option<String>,
    },
    MergeCompleted {
        source_branch: String,
        target_branch: String,
        strategy: MergeStrategy,
        merge_commit_hash: Option<CommitHash>,
    },
}

impl DomainEvent {
    /// Dotted event type, e.g. `branch.created`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BranchCreated { .. } => "branch.created",
            Self::BranchDeleted { .. } => "branch.deleted",
            Self::ProposalCreated { .. } => "proposal.created",
            Self::ProposalApproved { .. } => "proposal.approved",
            Self::ProposalRejected { .. } => "proposal.rejected",
            Self::MergeCompleted { .. } => "merge.completed",
        }
    }

    /// The payload without the variant name.
    pub fn payload(&self) -> EventResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn into_event(self) -> EventResult<Event> {
        let payload = self.payload()?;
        Ok(Event::new(self.event_type(), payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_has_flat_fields() {
        let event = DomainEvent::BranchDeleted {
            branch_name: "feature/x".into(),
            author: "alice".into(),
        }
        .into_event()
        .unwrap();
        assert_eq!(event.event_type, "branch.deleted");
        assert_eq!(event.payload, json!({"branch_name": "feature/x", "author": "alice"}));
    }

    #[test]
    fn merge_completed_payload() {
        let hash = CommitHash::digest(b"merge");
        let payload = DomainEvent::MergeCompleted {
            source_branch: "feature/x".into(),
            target_branch: "main".into(),
            strategy: MergeStrategy::Squash,
            merge_commit_hash: Some(hash),
        }
        .payload()
        .unwrap();
        assert_eq!(payload["strategy"], "squash");
        assert_eq!(payload["merge_commit_hash"], serde_json::to_value(hash).unwrap());
    }

    #[test]
    fn rejection_reason_is_optional() {
        let event = DomainEvent::ProposalRejected {
            proposal_id: ProposalId::new(),
            by: "bob".into(),
            reason: None,
        };
        assert_eq!(event.event_type(), "proposal.rejected");
        assert!(event.payload().unwrap()["reason"].is_null());
    }
}
