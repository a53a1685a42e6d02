use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use ontovc_store::BackingStore;

use crate::backend::CacheBackend;
use crate::error::CacheResult;

/// Location of a cached value: database, branch, document type and key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub db: String,
    pub branch: String,
    pub doc_type: String,
    pub key: String,
}

impl CacheKey {
    pub fn new(db: &str, branch: &str, doc_type: &str, key: &str) -> Self {
        Self {
            db: db.to_string(),
            branch: branch.to_string(),
            doc_type: doc_type.to_string(),
            key: key.to_string(),
        }
    }

    /// Prefix shared by every key of one branch.
    pub fn branch_prefix(db: &str, branch: &str) -> String {
        format!("{db}:{branch}:")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.db, self.branch, self.doc_type, self.key)
    }
}

/// Read-through cache over a [`CacheBackend`], scoped by database and branch.
///
/// Every backend failure is logged and treated as a miss.
#[derive(Clone)]
pub struct BranchCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Option<Duration>,
}

impl BranchCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Option<Duration>) -> Self {
        Self { backend, ttl }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Return the cached value for `key`, or run `query_factory` and cache
    /// its result.
    ///
    /// Errors from the query propagate unchanged and are never cached. A
    /// `null` result is returned but not cached.
    pub async fn get_with_optimization<T, E, F, Fut>(
        &self,
        key: &str,
        db: &str,
        branch: &str,
        query_factory: F,
        doc_type: &str,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cache_key = CacheKey::new(db, branch, doc_type, key).to_string();

        match self.backend.get(&cache_key).await {
            Ok(Some(cached)) => match serde_json::from_value::<T>(cached) {
                Ok(value) => {
                    debug!(key = %cache_key, "cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key = %cache_key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = %cache_key, "cache miss"),
            Err(e) => warn!(key = %cache_key, error = %e, "cache read failed"),
        }

        let value = query_factory().await?;

        match serde_json::to_value(&value) {
            Ok(Value::Null) => {}
            Ok(encoded) => {
                if let Err(e) = self.backend.put(&cache_key, encoded, self.ttl).await {
                    warn!(key = %cache_key, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(key = %cache_key, error = %e, "cache encode failed"),
        }
        Ok(value)
    }

    /// Preload every document of the given types on `branch`.
    ///
    /// Each document body is cached under its document id. Returns the
    /// number of entries written.
    pub async fn warm_cache_for_branch(
        &self,
        store: &dyn BackingStore,
        db: &str,
        branch: &str,
        doc_types: &[&str],
    ) -> CacheResult<usize> {
        let mut written = 0;
        for doc_type in doc_types.iter().copied() {
            let documents = store.list_documents(db, branch, Some(doc_type)).await?;
            for doc in documents {
                let key = CacheKey::new(db, branch, doc_type, &doc.id).to_string();
                self.backend.put(&key, doc.body, self.ttl).await?;
                written += 1;
            }
        }
        debug!(db, branch, written, "warmed cache");
        Ok(written)
    }

    /// Drop one cached value.
    pub async fn invalidate(&self, db: &str, branch: &str, doc_type: &str, key: &str) {
        let cache_key = CacheKey::new(db, branch, doc_type, key).to_string();
        if let Err(e) = self.backend.invalidate(&cache_key).await {
            warn!(key = %cache_key, error = %e, "cache invalidation failed");
        }
    }

    /// Drop every cached value of a branch.
    pub async fn invalidate_branch(&self, db: &str, branch: &str) -> CacheResult<usize> {
        let removed = self
            .backend
            .invalidate_prefix(&CacheKey::branch_prefix(db, branch))
            .await?;
        debug!(db, branch, removed, "invalidated branch cache");
        Ok(removed)
    }
}

impl fmt::Debug for BranchCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchCache").field("ttl", &self.ttl).finish()
    }
}
