use std::sync::Arc;

use tracing::debug;

use ontovc_store::BackingStore;
use ontovc_types::{CommitHash, Snapshot};

use crate::branch_diff::BranchDiff;
use crate::error::{DiffError, DiffResult};
use crate::history;
use crate::snapshot_diff::diff_snapshots;

/// Computes branch diffs against a backing store database.
#[derive(Clone)]
pub struct DiffEngine {
    store: Arc<dyn BackingStore>,
    db: String,
}

impl DiffEngine {
    pub fn new(store: Arc<dyn BackingStore>, db: impl Into<String>) -> Self {
        Self {
            store,
            db: db.into(),
        }
    }

    /// Current head of `branch`.
    pub async fn head_of(&self, branch: &str) -> DiffResult<CommitHash> {
        self.store
            .get_branch_info(&self.db, branch)
            .await?
            .map(|info| info.head)
            .ok_or_else(|| DiffError::BranchNotFound(branch.to_string()))
    }

    /// Schema snapshot at the head of `branch`.
    pub async fn branch_snapshot(&self, branch: &str) -> DiffResult<Snapshot> {
        let head = self.head_of(branch).await?;
        history::snapshot_at(self.store.as_ref(), &self.db, &head).await
    }

    /// Compare `source_branch` against `target_branch`.
    ///
    /// The result is deterministic for fixed heads. Conflicts are left empty.
    pub async fn compute_diff(&self, source_branch: &str, target_branch: &str) -> DiffResult<BranchDiff> {
        let store = self.store.as_ref();
        let source_head = self.head_of(source_branch).await?;
        let target_head = self.head_of(target_branch).await?;

        let source = history::snapshot_at(store, &self.db, &source_head).await?;
        let target = history::snapshot_at(store, &self.db, &target_head).await?;

        let merge_base = history::merge_base(store, &self.db, source_head, target_head).await?;
        let base = match &merge_base {
            Some(hash) => history::snapshot_at(store, &self.db, hash).await?,
            None => Snapshot::new(),
        };

        let direct = diff_snapshots(&target, &source);
        let source_changes = diff_snapshots(&base, &source);
        let target_changes = diff_snapshots(&base, &target);

        debug!(
            source = source_branch,
            target = target_branch,
            added = direct.added_keys().len(),
            modified = direct.modified.len(),
            deleted = direct.deleted_keys().len(),
            "computed branch diff"
        );

        Ok(BranchDiff {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            source_head,
            target_head,
            merge_base,
            added: direct.added_keys(),
            modified: direct.modified_keys(),
            deleted: direct.deleted_keys(),
            renamed: direct.renamed_pairs(),
            source_changes,
            target_changes,
            conflicts: Vec::new(),
        })
    }
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine").field("db", &self.db).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontovc_store::InMemoryBackingStore;
    use ontovc_types::{ObjectTypeDef, PropertyDef, ResourceKey, SchemaResource};

    const DB: &str = "db";

    async fn put(store: &InMemoryBackingStore, branch: &str, resource: SchemaResource) {
        store
            .insert_document(&resource.to_document().unwrap(), DB, branch, "edit", "test")
            .await
            .unwrap();
    }

    fn object(name: &str, description: &str) -> SchemaResource {
        SchemaResource::ObjectType(ObjectTypeDef::new(name).with_description(description))
    }

    async fn fixture() -> (Arc<InMemoryBackingStore>, DiffEngine) {
        let store = Arc::new(InMemoryBackingStore::new());
        store.create_branch(DB, "main", None).await.unwrap();
        put(&store, "main", object("Product", "base")).await;
        put(&store, "main", object("Order", "base")).await;
        store.create_branch(DB, "feature", Some("main")).await.unwrap();
        let engine = DiffEngine::new(store.clone(), DB);
        (store, engine)
    }

    #[tokio::test]
    async fn fresh_branch_is_identical() {
        let (_store, engine) = fixture().await;
        let diff = engine.compute_diff("feature", "main").await.unwrap();
        assert!(diff.is_identical());
        assert!(diff.source_is_unchanged());
        assert_eq!(diff.merge_base, Some(diff.target_head));
    }

    #[tokio::test]
    async fn diff_is_source_relative() {
        let (store, engine) = fixture().await;
        put(&store, "feature", object("Product", "changed")).await;
        put(&store, "feature", SchemaResource::Property(PropertyDef::new("price", "decimal"))).await;
        store
            .delete_document("ObjectType/Order", DB, "feature", "rm", "test")
            .await
            .unwrap();

        let diff = engine.compute_diff("feature", "main").await.unwrap();
        assert_eq!(diff.added, vec![ResourceKey::property("price")]);
        assert_eq!(diff.modified, vec![ResourceKey::object_type("Product")]);
        assert_eq!(diff.deleted, vec![ResourceKey::object_type("Order")]);
        assert_eq!(diff.source_changes.len(), 3);
        assert!(diff.target_changes.is_empty());

        let reverse = engine.compute_diff("main", "feature").await.unwrap();
        assert_eq!(reverse.added, diff.deleted);
        assert_eq!(reverse.deleted, diff.added);
    }

    #[tokio::test]
    async fn compute_diff_is_deterministic() {
        let (store, engine) = fixture().await;
        put(&store, "feature", object("Zeta", "z")).await;
        put(&store, "feature", object("Alpha", "a")).await;
        put(&store, "main", object("Order", "main edit")).await;

        let first = engine.compute_diff("feature", "main").await.unwrap();
        let second = engine.compute_diff("feature", "main").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.added,
            vec![ResourceKey::object_type("Alpha"), ResourceKey::object_type("Zeta")]
        );
    }

    #[tokio::test]
    async fn missing_branch_is_not_found() {
        let (_store, engine) = fixture().await;
        let err = engine.compute_diff("ghost", "main").await.unwrap_err();
        assert!(matches!(err, DiffError::BranchNotFound(name) if name == "ghost"));
    }
}
