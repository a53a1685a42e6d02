//! In-memory backing store for tests and embedding.
//!
//! [`InMemoryBackingStore`] keeps every database, branch and commit in
//! `HashMap`s behind one `RwLock`, so each trait call is atomic. It also
//! supports fault injection so callers can exercise rollback paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use ontovc_types::{CommitHash, Document};

use crate::error::{StoreError, StoreResult};
use crate::traits::BackingStore;
use crate::types::{CommitInfo, NativeBranchInfo, NewCommit};

struct StoredCommit {
    info: CommitInfo,
    documents: BTreeMap<String, Document>,
}

struct BranchRecord {
    head: CommitHash,
    parent: Option<String>,
    protected: bool,
}

#[derive(Default)]
struct Database {
    branches: BTreeMap<String, BranchRecord>,
    commits: HashMap<CommitHash, StoredCommit>,
}

impl Database {
    fn branch(&self, name: &str) -> StoreResult<&BranchRecord> {
        self.branches
            .get(name)
            .ok_or_else(|| StoreError::BranchNotFound(name.to_string()))
    }

    fn head_documents(&self, branch: &str) -> StoreResult<&BTreeMap<String, Document>> {
        let head = self.branch(branch)?.head;
        self.commits
            .get(&head)
            .map(|c| &c.documents)
            .ok_or(StoreError::CommitNotFound(head))
    }
}

/// Canonical encoding hashed into a commit id.
#[derive(Serialize)]
struct CommitEncoding<'a> {
    parents: &'a [CommitHash],
    message: &'a str,
    author: &'a str,
    timestamp: i64,
    documents: &'a BTreeMap<String, Document>,
}

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    /// Number of commit writes still allowed before writes start failing.
    commit_budget: Mutex<Option<usize>>,
}

/// An in-memory implementation of [`BackingStore`].
///
/// Databases are created implicitly by the first `create_branch`; reads
/// against an unknown database see no branches.
#[derive(Default)]
pub struct InMemoryBackingStore {
    databases: RwLock<HashMap<String, Database>>,
    faults: Faults,
}

impl InMemoryBackingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Allow `n` more commit writes, then fail every further one.
    ///
    /// Counts all commit-producing calls: `write_commit`, `insert_document`,
    /// `delete_document` and root commits from `create_branch`.
    pub fn fail_commit_writes_after(&self, n: usize) {
        if let Ok(mut budget) = self.faults.commit_budget.lock() {
            *budget = Some(n);
        }
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.set_unavailable(false);
        if let Ok(mut budget) = self.faults.commit_budget.lock() {
            *budget = None;
        }
    }

    /// Number of commits stored for `db`.
    pub fn commit_count(&self, db: &str) -> usize {
        self.databases
            .read()
            .map(|dbs| dbs.get(db).map_or(0, |d| d.commits.len()))
            .unwrap_or(0)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn consume_commit_budget(&self) -> StoreResult<()> {
        let mut budget = self
            .faults
            .commit_budget
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))?;
        match budget.as_mut() {
            Some(0) => Err(StoreError::Unavailable("injected commit write failure".into())),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Database>>> {
        self.check_available()?;
        self.databases
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Database>>> {
        self.check_available()?;
        self.databases
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Hash and store a commit inside an already-locked database.
    fn store_commit(
        &self,
        database: &mut Database,
        parents: Vec<CommitHash>,
        documents: BTreeMap<String, Document>,
        message: &str,
        author: &str,
    ) -> StoreResult<CommitHash> {
        self.consume_commit_budget()?;

        for parent in &parents {
            if !database.commits.contains_key(parent) {
                return Err(StoreError::CommitNotFound(*parent));
            }
        }

        let timestamp: DateTime<Utc> = Utc::now();
        let encoding = CommitEncoding {
            parents: &parents,
            message,
            author,
            timestamp: timestamp.timestamp_nanos_opt().unwrap_or_default(),
            documents: &documents,
        };
        let hash =
            CommitHash::of_commit(&encoding).map_err(|e| StoreError::Serialization(e.to_string()))?;

        database.commits.entry(hash).or_insert_with(|| StoredCommit {
            info: CommitInfo {
                hash,
                parents,
                message: message.to_string(),
                author: author.to_string(),
                timestamp,
            },
            documents,
        });
        debug!(commit = %hash.short_hex(), message, "stored commit");
        Ok(hash)
    }
}

impl std::fmt::Debug for InMemoryBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.databases.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("InMemoryBackingStore")
            .field("database_count", &count)
            .finish()
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn create_branch(
        &self,
        db: &str,
        name: &str,
        from_branch: Option<&str>,
    ) -> StoreResult<NativeBranchInfo> {
        let mut dbs = self.write()?;
        let database = dbs.entry(db.to_string()).or_default();

        if database.branches.contains_key(name) {
            return Err(StoreError::BranchExists(name.to_string()));
        }

        let head = match from_branch {
            Some(parent) => database.branch(parent)?.head,
            None => self.store_commit(database, Vec::new(), BTreeMap::new(), "initial commit", "system")?,
        };

        database.branches.insert(
            name.to_string(),
            BranchRecord {
                head,
                parent: from_branch.map(str::to_string),
                protected: false,
            },
        );
        debug!(db, branch = name, from = ?from_branch, "created branch");

        Ok(NativeBranchInfo {
            name: name.to_string(),
            head,
            parent: from_branch.map(str::to_string),
            protected: false,
        })
    }

    async fn delete_branch(&self, db: &str, name: &str) -> StoreResult<bool> {
        let mut dbs = self.write()?;
        Ok(dbs
            .get_mut(db)
            .map(|d| d.branches.remove(name).is_some())
            .unwrap_or(false))
    }

    async fn get_branch_info(&self, db: &str, name: &str) -> StoreResult<Option<NativeBranchInfo>> {
        let dbs = self.read()?;
        Ok(dbs.get(db).and_then(|d| d.branches.get(name)).map(|record| {
            NativeBranchInfo {
                name: name.to_string(),
                head: record.head,
                parent: record.parent.clone(),
                protected: record.protected,
            }
        }))
    }

    async fn list_branches(&self, db: &str) -> StoreResult<Vec<String>> {
        let dbs = self.read()?;
        Ok(dbs
            .get(db)
            .map(|d| d.branches.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_branch_protected(&self, db: &str, name: &str, protected: bool) -> StoreResult<()> {
        let mut dbs = self.write()?;
        let record = dbs
            .get_mut(db)
            .and_then(|d| d.branches.get_mut(name))
            .ok_or_else(|| StoreError::BranchNotFound(name.to_string()))?;
        record.protected = protected;
        Ok(())
    }

    async fn insert_document(
        &self,
        doc: &Document,
        db: &str,
        branch: &str,
        message: &str,
        author: &str,
    ) -> StoreResult<CommitHash> {
        let mut dbs = self.write()?;
        let database = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;

        let head = database.branch(branch)?.head;
        let mut documents = database.head_documents(branch)?.clone();
        documents.insert(doc.id.clone(), doc.clone());

        let hash = self.store_commit(database, vec![head], documents, message, author)?;
        if let Some(record) = database.branches.get_mut(branch) {
            record.head = hash;
        }
        Ok(hash)
    }

    async fn get_document(&self, id: &str, db: &str, branch: &str) -> StoreResult<Option<Document>> {
        let dbs = self.read()?;
        let database = dbs
            .get(db)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        Ok(database.head_documents(branch)?.get(id).cloned())
    }

    async fn delete_document(
        &self,
        id: &str,
        db: &str,
        branch: &str,
        message: &str,
        author: &str,
    ) -> StoreResult<Option<CommitHash>> {
        let mut dbs = self.write()?;
        let database = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;

        let head = database.branch(branch)?.head;
        let mut documents = database.head_documents(branch)?.clone();
        if documents.remove(id).is_none() {
            return Ok(None);
        }

        let hash = self.store_commit(database, vec![head], documents, message, author)?;
        if let Some(record) = database.branches.get_mut(branch) {
            record.head = hash;
        }
        Ok(Some(hash))
    }

    async fn list_documents(
        &self,
        db: &str,
        branch: &str,
        doc_type: Option<&str>,
    ) -> StoreResult<Vec<Document>> {
        let dbs = self.read()?;
        let database = dbs
            .get(db)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        Ok(database
            .head_documents(branch)?
            .values()
            .filter(|d| doc_type.map_or(true, |t| d.doc_type == t))
            .cloned()
            .collect())
    }

    async fn get_commit(&self, db: &str, hash: &CommitHash) -> StoreResult<Option<CommitInfo>> {
        let dbs = self.read()?;
        Ok(dbs
            .get(db)
            .and_then(|d| d.commits.get(hash))
            .map(|c| c.info.clone()))
    }

    async fn commit_documents(&self, db: &str, hash: &CommitHash) -> StoreResult<Vec<Document>> {
        let dbs = self.read()?;
        dbs.get(db)
            .and_then(|d| d.commits.get(hash))
            .map(|c| c.documents.values().cloned().collect())
            .ok_or(StoreError::CommitNotFound(*hash))
    }

    async fn write_commit(&self, db: &str, commit: NewCommit) -> StoreResult<CommitHash> {
        let mut dbs = self.write()?;
        let database = dbs.entry(db.to_string()).or_default();
        let documents: BTreeMap<String, Document> = commit
            .documents
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        self.store_commit(
            database,
            commit.parents,
            documents,
            &commit.message,
            &commit.author,
        )
    }

    async fn update_branch_head(
        &self,
        db: &str,
        branch: &str,
        expected: CommitHash,
        new: CommitHash,
    ) -> StoreResult<()> {
        let mut dbs = self.write()?;
        let database = dbs
            .get_mut(db)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        if !database.commits.contains_key(&new) {
            return Err(StoreError::CommitNotFound(new));
        }
        let record = database
            .branches
            .get_mut(branch)
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        if record.head != expected {
            return Err(StoreError::HeadMoved {
                branch: branch.to_string(),
                expected,
                actual: record.head,
            });
        }
        record.head = new;
        debug!(db, branch, head = %new.short_hex(), "moved branch head");
        Ok(())
    }
}
