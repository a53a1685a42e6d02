use std::sync::Arc;

use tracing::{debug, info, warn};

use ontovc_cache::{BranchCache, InMemoryCache};
use ontovc_events::{DomainEvent, EventPublisher, EventSink};
use ontovc_lock::{FileLockStore, InMemoryLockStore, LockManager, LockStore};
use ontovc_store::{BackingStore, NativeBranchInfo, StoreError};
use ontovc_types::{validate_branch_name, Branch, Document, ProtectionRules, BRANCH_METADATA_DOC_TYPE};

use crate::config::{ConfigError, ServiceConfig};
use crate::error::{BranchError, BranchResult};

/// Author recorded on records the service writes on its own behalf.
pub const SYSTEM_USER: &str = "system";

/// Branch lifecycle, proposals, merges and locks over one database of a
/// backing store.
///
/// Every collaborator is injected; the service holds no global state.
pub struct BranchService {
    pub(crate) config: ServiceConfig,
    pub(crate) rules: ProtectionRules,
    pub(crate) store: Arc<dyn BackingStore>,
    pub(crate) cache: BranchCache,
    pub(crate) locks: LockManager,
    pub(crate) events: Arc<EventPublisher>,
}

impl BranchService {
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn BackingStore>,
        cache: BranchCache,
        locks: LockManager,
        events: Arc<EventPublisher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rules = config.protection_rules()?;
        Ok(Self {
            config,
            rules,
            store,
            cache,
            locks,
            events,
        })
    }

    /// Build a service with an in-memory cache, the lock store named by the
    /// config and a publisher delivering to `sink`. Must be called within a
    /// tokio runtime.
    pub async fn from_config(
        config: ServiceConfig,
        store: Arc<dyn BackingStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, BranchError> {
        let cache = BranchCache::new(Arc::new(InMemoryCache::new()), config.cache.ttl());
        let lock_store: Arc<dyn LockStore> = match &config.locks.dir {
            Some(dir) => Arc::new(FileLockStore::open(dir).await?),
            None => Arc::new(InMemoryLockStore::new()),
        };
        let locks = LockManager::new(lock_store, config.locks.ttl());
        let events = Arc::new(EventPublisher::start(sink, config.events.clone()));
        Self::new(config, store, cache, locks, events).map_err(|e| BranchError::Validation(e.to_string()))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub(crate) fn db(&self) -> &str {
        &self.config.database
    }

    pub(crate) fn system_branch(&self) -> &str {
        &self.config.system_branch
    }

    /// Ensure the default and system branches exist and warm the cache.
    ///
    /// Cache warm failures are logged and otherwise ignored.
    pub async fn initialize(&self) -> BranchResult<()> {
        self.ensure_root_branch(self.system_branch()).await?;
        let created_main = self.ensure_root_branch(&self.config.default_parent).await?;

        let main = self.config.default_parent.clone();
        if self.rules.is_protected(&main) {
            self.store.set_branch_protected(self.db(), &main, true).await?;
        }
        if created_main || self.load_metadata(&main).await?.is_none() {
            if let Some(info) = self.store.get_branch_info(self.db(), &main).await? {
                let mut branch = Branch::new(&main, None, info.head, SYSTEM_USER)
                    .with_description(Some("Default branch".into()));
                branch.is_protected = self.rules.is_protected(&main);
                self.save_metadata(&branch, "initialize default branch", SYSTEM_USER)
                    .await?;
            }
        }

        let doc_types: Vec<&str> = self.config.cache.warm_doc_types.iter().map(String::as_str).collect();
        match self
            .cache
            .warm_cache_for_branch(self.store.as_ref(), self.db(), &main, &doc_types)
            .await
        {
            Ok(written) => debug!(branch = %main, written, "cache warmed"),
            Err(e) => warn!(branch = %main, error = %e, "cache warm failed"),
        }

        info!(db = %self.db(), default_branch = %main, "branch service initialized");
        Ok(())
    }

    /// Create `name` at a fresh root unless it exists. Returns whether it was
    /// created.
    async fn ensure_root_branch(&self, name: &str) -> BranchResult<bool> {
        if self.store.get_branch_info(self.db(), name).await?.is_some() {
            return Ok(false);
        }
        match self.store.create_branch(self.db(), name, None).await {
            Ok(_) => {
                info!(branch = name, "created root branch");
                Ok(true)
            }
            Err(StoreError::BranchExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop accepting events and wait for queued events to be delivered.
    pub async fn shutdown(&self) {
        self.events.shutdown().await;
        info!("branch service shut down");
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        self.events.publish(event);
    }

    pub(crate) fn is_protected(&self, info: &NativeBranchInfo) -> bool {
        info.protected || info.name == self.config.system_branch || self.rules.is_protected(&info.name)
    }

    pub(crate) async fn require_branch(&self, name: &str) -> BranchResult<NativeBranchInfo> {
        self.store
            .get_branch_info(self.db(), name)
            .await?
            .ok_or_else(|| BranchError::branch_not_found(name))
    }

    pub(crate) fn require_user(user: &str) -> BranchResult<()> {
        if user.trim().is_empty() {
            return Err(BranchError::Validation("user must not be empty".into()));
        }
        Ok(())
    }

    async fn load_metadata(&self, name: &str) -> BranchResult<Option<Branch>> {
        let doc = self
            .store
            .get_document(&Branch::metadata_id(name), self.db(), self.system_branch())
            .await?;
        Ok(match doc {
            Some(doc) => Some(doc.parse_body()?),
            None => None,
        })
    }

    async fn save_metadata(&self, branch: &Branch, message: &str, user: &str) -> BranchResult<()> {
        let doc = Document::from_serializable(&branch.id, BRANCH_METADATA_DOC_TYPE, branch)?;
        self.store
            .insert_document(&doc, self.db(), self.system_branch(), message, user)
            .await?;
        Ok(())
    }

    pub(crate) async fn invalidate_branch_cache(&self, name: &str) {
        if let Err(e) = self.cache.invalidate_branch(self.db(), name).await {
            warn!(branch = name, error = %e, "cache invalidation failed");
        }
    }

    /// Create `name` from `from_branch` (the configured default parent when
    /// `None`).
    pub async fn create_branch(
        &self,
        name: &str,
        from_branch: Option<&str>,
        description: Option<String>,
        user: &str,
    ) -> BranchResult<Branch> {
        validate_branch_name(name)?;
        Self::require_user(user)?;
        let parent = from_branch.unwrap_or(&self.config.default_parent).to_string();
        self.require_branch(&parent).await?;

        let info = self.store.create_branch(self.db(), name, Some(&parent)).await?;

        let mut branch = Branch::new(name, Some(parent.clone()), info.head, user).with_description(description);
        branch.is_protected = self.rules.is_protected(name);

        let message = format!("create branch {name}");
        let recorded = async {
            if branch.is_protected {
                self.store.set_branch_protected(self.db(), name, true).await?;
            }
            self.save_metadata(&branch, &message, user).await
        }
        .await;

        if let Err(e) = recorded {
            warn!(branch = name, error = %e, "branch metadata write failed; removing branch");
            if let Err(cleanup) = self.store.delete_branch(self.db(), name).await {
                warn!(branch = name, error = %cleanup, "failed to remove branch after metadata failure");
            }
            return Err(e);
        }

        self.publish(DomainEvent::BranchCreated {
            branch_name: name.to_string(),
            parent_branch: parent.clone(),
            author: user.to_string(),
            description: branch.description.clone(),
        });
        info!(branch = name, parent = %parent, author = user, head = %info.head.short_hex(), "created branch");
        Ok(branch)
    }

    /// Delete `name`. Protected branches and branches holding a lock cannot
    /// be deleted.
    pub async fn delete_branch(&self, name: &str, user: &str) -> BranchResult<bool> {
        Self::require_user(user)?;
        let info = self.require_branch(name).await?;
        if self.is_protected(&info) {
            return Err(BranchError::PolicyViolation(format!(
                "branch {name} is protected and cannot be deleted"
            )));
        }
        let held = self.locks.active_locks(name).await?;
        if let Some(lock) = held.first() {
            return Err(BranchError::Conflict(format!(
                "branch {name} is locked for {} by {}",
                lock.lock_type, lock.locked_by
            )));
        }

        // Metadata goes first so a failed write leaves the branch whole.
        self.store
            .delete_document(
                &Branch::metadata_id(name),
                self.db(),
                self.system_branch(),
                &format!("delete branch {name}"),
                user,
            )
            .await?;
        if !self.store.delete_branch(self.db(), name).await? {
            return Err(BranchError::branch_not_found(name));
        }
        self.invalidate_branch_cache(name).await;

        self.publish(DomainEvent::BranchDeleted {
            branch_name: name.to_string(),
            author: user.to_string(),
        });
        info!(branch = name, author = user, "deleted branch");
        Ok(true)
    }

    /// The branch record, or `None` if the store has no such branch.
    ///
    /// Metadata is read through the cache; head and protection always come
    /// from the store. Without metadata a minimal record is rebuilt from the
    /// store's own branch info.
    pub async fn get_branch(&self, name: &str) -> BranchResult<Option<Branch>> {
        let Some(info) = self.store.get_branch_info(self.db(), name).await? else {
            return Ok(None);
        };

        let metadata: Option<Branch> = self
            .cache
            .get_with_optimization(
                &Branch::metadata_id(name),
                self.db(),
                name,
                || self.load_metadata(name),
                BRANCH_METADATA_DOC_TYPE,
            )
            .await?;

        let mut branch = match metadata {
            Some(branch) => branch,
            None => {
                debug!(branch = name, "no metadata; using store branch info");
                Branch::new(name, info.parent.clone(), info.head, SYSTEM_USER)
            }
        };
        branch.head_hash = info.head;
        branch.is_protected = self.is_protected(&info);
        Ok(Some(branch))
    }

    /// Every branch except the system branch, sorted by name.
    pub async fn list_branches(&self) -> BranchResult<Vec<Branch>> {
        let mut branches = Vec::new();
        for name in self.store.list_branches(self.db()).await? {
            if name == self.config.system_branch {
                continue;
            }
            if let Some(branch) = self.get_branch(&name).await? {
                branches.push(branch);
            }
        }
        Ok(branches)
    }
}

impl std::fmt::Debug for BranchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchService")
            .field("database", &self.config.database)
            .field("rules", &self.rules)
            .finish()
    }
}
