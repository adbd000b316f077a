//! Store capability contract used by the leaderboard core.
//!
//! The core only needs sorted-set increments, hash field writes, expirations
//! and a descending range read. Implementations must be safe to share across
//! concurrent workers.

mod errors;
pub mod memory;
pub mod redis_store;

pub use errors::StoreError;
pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds `delta` to `member`, creating the set and member when absent.
    async fn incr_sorted_set(&self, key: &str, member: &str, delta: f64)
        -> Result<f64, StoreError>;

    /// Writes all fields in one atomic batch, creating the hash when absent.
    async fn set_hash_fields(&self, key: &str, fields: &[(&str, String)])
        -> Result<(), StoreError>;

    /// Unconditionally sets the expiration. Returns false when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Sets the expiration only if the key exists and has none yet.
    /// Returns true when this call armed the TTL.
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// All members by descending score. Missing keys yield an empty vec.
    async fn range_sorted_set_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError>;

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Remaining time to live; `None` when the key is missing or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;
}

/// Bounds a single store call so a stalled connection cannot block the caller forever.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}
