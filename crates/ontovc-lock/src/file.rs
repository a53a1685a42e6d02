use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ontovc_types::LockId;

use crate::error::{LockError, LockResult};
use crate::memory::sort_oldest_first;
use crate::traits::LockStore;
use crate::types::Lock;

const RELEASED_DIR: &str = "released";

/// Lock store that keeps one JSON file per lock record.
///
/// Active records live in `<dir>/<lock id>.json`; released ones are moved to
/// `<dir>/released/`, so acquisition only ever reads the active set. New
/// records are created with `create_new`, so an id is never written twice.
/// An internal mutex serializes operations; the directory is expected to be
/// owned by one process at a time.
#[derive(Debug)]
pub struct FileLockStore {
    dir: PathBuf,
    guard: Mutex<()>,
}

impl FileLockStore {
    /// Open (creating if needed) a lock directory.
    ///
    /// Released records left in the active directory by an interrupted
    /// release are moved to the archive.
    pub async fn open(dir: impl Into<PathBuf>) -> LockResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(RELEASED_DIR)).await?;
        let store = Self {
            dir,
            guard: Mutex::new(()),
        };
        for lock in store.read_dir(&store.dir).await? {
            if !lock.is_active() {
                store.archive(&lock.id).await?;
            }
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, id: &LockId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn released_path(&self, id: &LockId) -> PathBuf {
        self.dir.join(RELEASED_DIR).join(format!("{id}.json"))
    }

    async fn read_lock(&self, path: &Path) -> LockResult<Option<Lock>> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| LockError::Serialization(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every readable record in `dir`. Unparseable files are skipped.
    async fn read_dir(&self, dir: &Path) -> LockResult<Vec<Lock>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut locks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_lock(&path).await {
                Ok(Some(lock)) => locks.push(lock),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable lock record"),
            }
        }
        Ok(locks)
    }

    async fn read_active(&self) -> LockResult<Vec<Lock>> {
        let locks = self.read_dir(&self.dir).await?;
        Ok(locks.into_iter().filter(Lock::is_active).collect())
    }

    async fn archive(&self, id: &LockId) -> LockResult<()> {
        fs::rename(self.lock_path(id), self.released_path(id)).await?;
        Ok(())
    }

    fn encode(lock: &Lock) -> LockResult<String> {
        serde_json::to_string_pretty(lock).map_err(|e| LockError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl LockStore for FileLockStore {
    async fn insert_if_free(&self, lock: &Lock) -> LockResult<Option<Lock>> {
        let _guard = self.guard.lock().await;
        if let Some(blocking) = self
            .read_active()
            .await?
            .into_iter()
            .find(|existing| existing.blocks(&lock.branch_name, &lock.lock_scope))
        {
            return Ok(Some(blocking));
        }

        let content = Self::encode(lock)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.lock_path(&lock.id))
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        Ok(None)
    }

    async fn get(&self, id: &LockId) -> LockResult<Option<Lock>> {
        let _guard = self.guard.lock().await;
        match self.read_lock(&self.lock_path(id)).await? {
            Some(lock) => Ok(Some(lock)),
            None => self.read_lock(&self.released_path(id)).await,
        }
    }

    async fn mark_released(&self, id: &LockId, by: &str, at: DateTime<Utc>) -> LockResult<Lock> {
        let _guard = self.guard.lock().await;
        let path = self.lock_path(id);
        let Some(mut lock) = self.read_lock(&path).await? else {
            return Err(if fs::try_exists(self.released_path(id)).await? {
                LockError::AlreadyReleased(id.clone())
            } else {
                LockError::NotFound(id.clone())
            });
        };
        if !lock.is_active() {
            return Err(LockError::AlreadyReleased(id.clone()));
        }
        lock.released_at = Some(at);
        lock.released_by = Some(by.to_string());

        // Rewrite in place first: a crash before the move leaves a released
        // record in the active directory, which `open` archives.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, Self::encode(&lock)?).await?;
        fs::rename(&tmp, &path).await?;
        self.archive(id).await?;
        Ok(lock)
    }

    async fn active_for_branch(&self, branch: &str) -> LockResult<Vec<Lock>> {
        let _guard = self.guard.lock().await;
        let locks = self.read_active().await?;
        Ok(sort_oldest_first(
            locks.into_iter().filter(|l| l.branch_name == branch).collect(),
        ))
    }

    async fn all_active(&self) -> LockResult<Vec<Lock>> {
        let _guard = self.guard.lock().await;
        Ok(sort_oldest_first(self.read_active().await?))
    }

    async fn prune_released(&self, before: DateTime<Utc>) -> LockResult<usize> {
        let _guard = self.guard.lock().await;
        let mut pruned = 0;
        for lock in self.read_dir(&self.dir.join(RELEASED_DIR)).await? {
            if lock.released_at.map_or(false, |at| at < before) {
                fs::remove_file(self.released_path(&lock.id)).await?;
                pruned += 1;
            }
        }
        debug!(dir = %self.dir.display(), pruned, "pruned released lock records");
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LockScope, LockType};
    use tempfile::tempdir;

    fn lock(branch: &str) -> Lock {
        Lock {
            id: LockId::new(),
            branch_name: branch.into(),
            lock_type: LockType::Merge,
            lock_scope: LockScope::Branch,
            locked_by: "alice".into(),
            reason: "merge".into(),
            acquired_at: Utc::now(),
            released_at: None,
            released_by: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let temp = tempdir().unwrap();
        let held = lock("feature");
        {
            let store = FileLockStore::open(temp.path()).await.unwrap();
            assert!(store.insert_if_free(&held).await.unwrap().is_none());
        }

        let store = FileLockStore::open(temp.path()).await.unwrap();
        let blocked = store.insert_if_free(&lock("feature")).await.unwrap();
        assert_eq!(blocked.map(|l| l.id), Some(held.id.clone()));
        assert_eq!(store.all_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_rewrites_record() {
        let temp = tempdir().unwrap();
        let store = FileLockStore::open(temp.path()).await.unwrap();
        let held = lock("feature");
        store.insert_if_free(&held).await.unwrap();

        store.mark_released(&held.id, "bob", Utc::now()).await.unwrap();
        let stored = store.get(&held.id).await.unwrap().unwrap();
        assert_eq!(stored.released_by.as_deref(), Some("bob"));
        assert!(store.active_for_branch("feature").await.unwrap().is_empty());
        assert!(store.insert_if_free(&lock("feature")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_files_are_skipped() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("junk.json"), "not json").unwrap();
        let store = FileLockStore::open(temp.path()).await.unwrap();
        assert!(store.all_active().await.unwrap().is_empty());
        assert!(store.insert_if_free(&lock("feature")).await.unwrap().is_none());
    }

    fn json_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
            .count()
    }

    #[tokio::test]
    async fn released_records_leave_the_active_directory() {
        let temp = tempdir().unwrap();
        let store = FileLockStore::open(temp.path()).await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..20 {
            let held = lock("main");
            assert!(store.insert_if_free(&held).await.unwrap().is_none());
            store.mark_released(&held.id, "alice", Utc::now()).await.unwrap();
            ids.push(held.id);
        }

        assert_eq!(json_files(temp.path()), 0);
        assert_eq!(json_files(&temp.path().join(RELEASED_DIR)), 20);
        assert!(store.insert_if_free(&lock("main")).await.unwrap().is_none());
        assert_eq!(json_files(temp.path()), 1);

        let old = store.get(&ids[0]).await.unwrap().unwrap();
        assert_eq!(old.released_by.as_deref(), Some("alice"));
        let err = store.mark_released(&ids[0], "alice", Utc::now()).await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyReleased(_)));

        let later = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.prune_released(later).await.unwrap(), 20);
        assert!(store.get(&ids[0]).await.unwrap().is_none());
        assert_eq!(store.all_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reopen_archives_interrupted_releases() {
        let temp = tempdir().unwrap();
        let mut stale = lock("main");
        stale.released_at = Some(Utc::now());
        stale.released_by = Some("alice".into());
        std::fs::write(
            temp.path().join(format!("{}.json", stale.id)),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let store = FileLockStore::open(temp.path()).await.unwrap();
        assert_eq!(json_files(temp.path()), 0);
        assert!(store.get(&stale.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let temp = tempdir().unwrap();
        let store = FileLockStore::open(temp.path()).await.unwrap();
        let err = store.mark_released(&LockId::new(), "bob", Utc::now()).await.unwrap_err();
        assert!(matches!(err, LockError::NotFound(_)));
    }
}
