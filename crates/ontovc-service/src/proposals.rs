//! Change proposal workflow.
//!
//! ```text
//! DRAFT --submit--> REVIEW --approve--> APPROVED --merge--> MERGED
//!   |                 |
//!   +----reject-------+--> REJECTED
//! ```
//!
//! Proposals are stored as documents on the system branch. Every status
//! change re-reads the proposal under a resource lock named after it, so two
//! reviewers racing on one proposal cannot both succeed.

use std::future::Future;

use chrono::Utc;
use tracing::info;

use ontovc_events::DomainEvent;
use ontovc_lock::{LockRequest, LockScope, LockType};
use ontovc_types::{ChangeProposal, Document, ProposalId, ProposalStatus, PROPOSAL_DOC_TYPE};

use crate::error::{BranchError, BranchResult};
use crate::service::BranchService;

impl BranchService {
    /// Open a DRAFT proposal to merge `source` into `target`.
    pub async fn create_proposal(
        &self,
        title: &str,
        description: Option<String>,
        source: &str,
        target: &str,
        user: &str,
    ) -> BranchResult<ChangeProposal> {
        if title.trim().is_empty() {
            return Err(BranchError::Validation("proposal title must not be empty".into()));
        }
        if source == target {
            return Err(BranchError::Validation(format!(
                "source and target are both {source}"
            )));
        }
        Self::require_user(user)?;
        self.require_branch(source).await?;
        self.require_branch(target).await?;

        let proposal = ChangeProposal::new(title.trim(), description, source, target, user);
        self.save_proposal(&proposal, user).await?;

        self.publish(DomainEvent::ProposalCreated {
            proposal_id: proposal.id.clone(),
            source_branch: source.to_string(),
            target_branch: target.to_string(),
            author: user.to_string(),
        });
        info!(proposal = %proposal.id, source, target, author = user, "created proposal");
        Ok(proposal)
    }

    pub async fn get_proposal(&self, id: &ProposalId) -> BranchResult<Option<ChangeProposal>> {
        let doc = self
            .store
            .get_document(&ChangeProposal::document_id(id), self.db(), self.system_branch())
            .await?;
        Ok(match doc {
            Some(doc) => Some(doc.parse_body()?),
            None => None,
        })
    }

    /// Proposals, oldest first, optionally restricted to one status.
    pub async fn list_proposals(&self, status: Option<ProposalStatus>) -> BranchResult<Vec<ChangeProposal>> {
        let docs = self
            .store
            .list_documents(self.db(), self.system_branch(), Some(PROPOSAL_DOC_TYPE))
            .await?;
        let mut proposals = docs
            .iter()
            .map(|doc| doc.parse_body::<ChangeProposal>())
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(status) = status {
            proposals.retain(|p| p.status == status);
        }
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(proposals)
    }

    /// Move a DRAFT proposal into REVIEW.
    pub async fn submit_proposal(&self, id: &ProposalId, user: &str) -> BranchResult<ChangeProposal> {
        Self::require_user(user)?;
        let proposal = self
            .with_proposal_lock(id, user, || async {
                let mut proposal = self.require_proposal(id).await?;
                Self::transition(&mut proposal, ProposalStatus::Review)?;
                self.save_proposal(&proposal, user).await?;
                Ok(proposal)
            })
            .await?;
        info!(proposal = %id, by = user, "submitted proposal for review");
        Ok(proposal)
    }

    pub async fn approve_proposal(&self, id: &ProposalId, approver: &str) -> BranchResult<bool> {
        Self::require_user(approver)?;
        self.with_proposal_lock(id, approver, || async {
            let mut proposal = self.require_proposal(id).await?;
            Self::transition(&mut proposal, ProposalStatus::Approved)?;
            proposal.reviewed_by = Some(approver.to_string());
            self.save_proposal(&proposal, approver).await
        })
        .await?;

        self.publish(DomainEvent::ProposalApproved {
            proposal_id: id.clone(),
            by: approver.to_string(),
        });
        info!(proposal = %id, by = approver, "approved proposal");
        Ok(true)
    }

    pub async fn reject_proposal(
        &self,
        id: &ProposalId,
        approver: &str,
        reason: Option<String>,
    ) -> BranchResult<bool> {
        Self::require_user(approver)?;
        self.with_proposal_lock(id, approver, || async {
            let mut proposal = self.require_proposal(id).await?;
            Self::transition(&mut proposal, ProposalStatus::Rejected)?;
            proposal.reviewed_by = Some(approver.to_string());
            proposal.rejection_reason = reason.clone();
            self.save_proposal(&proposal, approver).await
        })
        .await?;

        self.publish(DomainEvent::ProposalRejected {
            proposal_id: id.clone(),
            by: approver.to_string(),
            reason,
        });
        info!(proposal = %id, by = approver, "rejected proposal");
        Ok(true)
    }

    /// Run `f` holding the write lock for one proposal on the system branch.
    /// A concurrent change to the same proposal fails with a conflict.
    pub(crate) async fn with_proposal_lock<T, F, Fut>(
        &self,
        id: &ProposalId,
        user: &str,
        f: F,
    ) -> BranchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BranchResult<T>>,
    {
        let request = LockRequest::new(self.system_branch(), LockType::Write, user)
            .with_scope(LockScope::Resource(format!("proposal:{id}")))
            .with_reason("proposal status change");
        self.locks.with_lock(request, |_| f()).await
    }

    pub(crate) async fn require_proposal(&self, id: &ProposalId) -> BranchResult<ChangeProposal> {
        self.get_proposal(id)
            .await?
            .ok_or_else(|| BranchError::proposal_not_found(id))
    }

    pub(crate) fn transition(proposal: &mut ChangeProposal, next: ProposalStatus) -> BranchResult<()> {
        if !proposal.status.can_transition_to(next) {
            return Err(BranchError::InvalidState(format!(
                "proposal {} is {} and cannot become {next}",
                proposal.id, proposal.status
            )));
        }
        proposal.status = next;
        proposal.updated_at = Utc::now();
        Ok(())
    }

    pub(crate) async fn save_proposal(&self, proposal: &ChangeProposal, user: &str) -> BranchResult<()> {
        let doc = Document::from_serializable(
            ChangeProposal::document_id(&proposal.id),
            PROPOSAL_DOC_TYPE,
            proposal,
        )?;
        self.store
            .insert_document(
                &doc,
                self.db(),
                self.system_branch(),
                &format!("proposal {} -> {}", proposal.id.short_id(), proposal.status),
                user,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::service::test_support::Harness;
    use ontovc_types::{ProposalId, ProposalStatus};

    async fn harness_with_feature() -> Harness {
        let h = Harness::new().await;
        h.service.create_branch("feature/x", None, None, "alice").await.unwrap();
        h
    }

    #[tokio::test]
    async fn create_validates_input() {
        let h = harness_with_feature().await;
        let err = h
            .service
            .create_proposal("  ", None, "feature/x", "main", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .service
            .create_proposal("Same", None, "main", "main", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .service
            .create_proposal("Ghost", None, "ghost", "main", "alice")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn review_and_approve() {
        let h = harness_with_feature().await;
        let p = h
            .service
            .create_proposal("Add price", Some("adds price".into()), "feature/x", "main", "alice")
            .await
            .unwrap();
        assert_eq!(p.status, ProposalStatus::Draft);

        let p = h.service.submit_proposal(&p.id, "alice").await.unwrap();
        assert_eq!(p.status, ProposalStatus::Review);
        assert!(h.service.approve_proposal(&p.id, "bob").await.unwrap());

        let stored = h.service.get_proposal(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Approved);
        assert_eq!(stored.reviewed_by.as_deref(), Some("bob"));
        assert_eq!(
            h.event_types().await,
            vec!["branch.created", "proposal.created", "proposal.approved"]
        );
    }

    #[tokio::test]
    async fn terminal_proposals_cannot_be_reviewed() {
        let h = harness_with_feature().await;
        let p = h
            .service
            .create_proposal("Add price", None, "feature/x", "main", "alice")
            .await
            .unwrap();
        assert!(h
            .service
            .reject_proposal(&p.id, "bob", Some("not now".into()))
            .await
            .unwrap());

        let stored = h.service.get_proposal(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.rejection_reason.as_deref(), Some("not now"));

        let err = h.service.approve_proposal(&p.id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = h.service.reject_proposal(&p.id, "bob", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = h.service.submit_proposal(&p.id, "alice").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn racing_reviews_never_move_a_proposal_backwards() {
        let h = Harness::yielding().await;
        h.service.create_branch("feature/x", None, None, "alice").await.unwrap();

        for _ in 0..5 {
            let p = h
                .service
                .create_proposal("Race", None, "feature/x", "main", "alice")
                .await
                .unwrap();
            let (approved, rejected) = tokio::join!(
                h.service.approve_proposal(&p.id, "bob"),
                h.service.reject_proposal(&p.id, "carol", Some("no".into())),
            );
            assert!(
                approved.is_ok() != rejected.is_ok(),
                "exactly one review wins: {approved:?} / {rejected:?}"
            );
            let loser = approved.as_ref().err().or(rejected.as_ref().err()).unwrap();
            assert!(matches!(loser.kind(), ErrorKind::Conflict | ErrorKind::InvalidState));

            let stored = h.service.get_proposal(&p.id).await.unwrap().unwrap();
            let expected = if approved.is_ok() {
                ProposalStatus::Approved
            } else {
                ProposalStatus::Rejected
            };
            assert_eq!(stored.status, expected);
        }

        let types = h.event_types().await;
        let reviews = types
            .iter()
            .filter(|t| *t == "proposal.approved" || *t == "proposal.rejected")
            .count();
        assert_eq!(reviews, 5);
    }

    #[tokio::test]
    async fn unknown_proposal_is_not_found() {
        let h = Harness::new().await;
        let id = ProposalId::new();
        assert!(h.service.get_proposal(&id).await.unwrap().is_none());
        let err = h.service.approve_proposal(&id, "bob").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let h = harness_with_feature().await;
        h.service.create_branch("feature/y", None, None, "alice").await.unwrap();
        let first = h
            .service
            .create_proposal("First", None, "feature/x", "main", "alice")
            .await
            .unwrap();
        let second = h
            .service
            .create_proposal("Second", None, "feature/y", "main", "alice")
            .await
            .unwrap();
        h.service.approve_proposal(&second.id, "bob").await.unwrap();

        let all = h.service.list_proposals(None).await.unwrap();
        assert_eq!(all.iter().map(|p| &p.id).collect::<Vec<_>>(), vec![&first.id, &second.id]);
        let drafts = h.service.list_proposals(Some(ProposalStatus::Draft)).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, first.id);
    }
}
