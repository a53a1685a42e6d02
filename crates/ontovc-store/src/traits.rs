use async_trait::async_trait;

use ontovc_types::{CommitHash, Document};

use crate::error::StoreResult;
use crate::types::{CommitInfo, NativeBranchInfo, NewCommit};

/// Branch-capable document store.
///
/// Implementations must be thread-safe and provide:
/// - Atomic branch creation: concurrent creates of one name yield exactly one
///   success; the others fail with `StoreError::BranchExists`.
/// - Document writes that commit on top of the branch head.
/// - Detached commits plus a compare-and-swap head update, so multi-commit
///   operations can publish their result in a single step.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Create `name` pointing at the head of `from_branch`.
    ///
    /// With `from_branch == None` the branch starts at a fresh empty root
    /// commit.
    async fn create_branch(
        &self,
        db: &str,
        name: &str,
        from_branch: Option<&str>,
    ) -> StoreResult<NativeBranchInfo>;

    /// Delete a branch. Returns `Ok(false)` if it did not exist.
    async fn delete_branch(&self, db: &str, name: &str) -> StoreResult<bool>;

    /// Store-native branch information, or `None` if the branch is absent.
    async fn get_branch_info(&self, db: &str, name: &str) -> StoreResult<Option<NativeBranchInfo>>;

    /// Names of every branch in the database, sorted.
    async fn list_branches(&self, db: &str) -> StoreResult<Vec<String>>;

    /// Set the store-native protection flag.
    async fn set_branch_protected(&self, db: &str, name: &str, protected: bool) -> StoreResult<()>;

    /// Insert or replace a document, committing on top of the branch head.
    async fn insert_document(
        &self,
        doc: &Document,
        db: &str,
        branch: &str,
        message: &str,
        author: &str,
    ) -> StoreResult<CommitHash>;

    /// Read a document at the branch head.
    async fn get_document(&self, id: &str, db: &str, branch: &str) -> StoreResult<Option<Document>>;

    /// Delete a document, committing on top of the branch head.
    ///
    /// Returns `Ok(None)` (and writes nothing) if the document did not exist.
    async fn delete_document(
        &self,
        id: &str,
        db: &str,
        branch: &str,
        message: &str,
        author: &str,
    ) -> StoreResult<Option<CommitHash>>;

    /// Every document at the branch head, optionally filtered by type.
    async fn list_documents(
        &self,
        db: &str,
        branch: &str,
        doc_type: Option<&str>,
    ) -> StoreResult<Vec<Document>>;

    /// Commit metadata, or `None` if unknown.
    async fn get_commit(&self, db: &str, hash: &CommitHash) -> StoreResult<Option<CommitInfo>>;

    /// The full document set recorded by a commit.
    async fn commit_documents(&self, db: &str, hash: &CommitHash) -> StoreResult<Vec<Document>>;

    /// Write a detached commit (no branch moves) and return its hash.
    async fn write_commit(&self, db: &str, commit: NewCommit) -> StoreResult<CommitHash>;

    /// Move `branch` from `expected` to `new`, failing with
    /// `StoreError::HeadMoved` if the head is no longer `expected`.
    async fn update_branch_head(
        &self,
        db: &str,
        branch: &str,
        expected: CommitHash,
        new: CommitHash,
    ) -> StoreResult<()>;
}
