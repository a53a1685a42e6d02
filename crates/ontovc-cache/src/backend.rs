use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CacheResult;

/// Key/value cache holding JSON values.
///
/// Implementations must be thread-safe. Expired entries must never be
/// returned by `get`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Look up a value.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store a value, optionally expiring after `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Drop a single key. Returns whether it was present.
    async fn invalidate(&self, key: &str) -> CacheResult<bool>;

    /// Drop every key starting with `prefix`, returning how many were removed.
    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<usize>;
}
