use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// A `HashMap`-backed [`CacheBackend`] with per-entry expiry.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|e| e.values().filter(|entry| entry.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> CacheError {
    CacheError::Backend(format!("cache lock poisoned: {e}"))
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get() {
        let cache = InMemoryCache::new();
        cache.put("a", json!(1), None).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_hidden() {
        let cache = InMemoryCache::new();
        cache
            .put("a", json!(1), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn prefix_invalidation() {
        let cache = InMemoryCache::new();
        cache.put("db:main:x", json!(1), None).await.unwrap();
        cache.put("db:main:y", json!(2), None).await.unwrap();
        cache.put("db:dev:x", json!(3), None).await.unwrap();

        assert_eq!(cache.invalidate_prefix("db:main:").await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate("db:dev:x").await.unwrap());
        assert!(!cache.invalidate("db:dev:x").await.unwrap());
    }
}
