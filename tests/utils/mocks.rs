use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leaderboard::{InMemoryStore, LeaderboardStore, StoreError};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Which calls a [`FailingStore`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Every,
    /// Only `expire` and `expire_if_unset`; writes and reads go through.
    Arming,
}

/// Wraps an in-memory store and fails calls on keys containing `pattern`
/// until its failure budget runs out.
pub struct FailingStore {
    inner: Arc<InMemoryStore>,
    pattern: String,
    fail_on: FailOn,
    remaining_failures: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<InMemoryStore>, pattern: &str, fail_on: FailOn, failures: usize) -> Self {
        Self {
            inner,
            pattern: pattern.to_string(),
            fail_on,
            remaining_failures: AtomicUsize::new(failures),
        }
    }

    pub fn remaining_failures(&self) -> usize {
        self.remaining_failures.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        self.check_call(key, false)
    }

    fn check_arming(&self, key: &str) -> Result<(), StoreError> {
        self.check_call(key, true)
    }

    fn check_call(&self, key: &str, arming: bool) -> Result<(), StoreError> {
        if !key.contains(&self.pattern) || (self.fail_on == FailOn::Arming && !arming) {
            return Ok(());
        }
        let consumed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(StoreError::Connection(format!("injected failure on {key}"))),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl LeaderboardStore for FailingStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check(key)?;
        self.inner.exists(key).await
    }

    async fn incr_sorted_set(&self, key: &str, member: &str, delta: f64) -> Result<f64, StoreError> {
        self.check(key)?;
        self.inner.incr_sorted_set(key, member, delta).await
    }

    async fn set_hash_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.check(key)?;
        self.inner.set_hash_fields(key, fields).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_arming(key)?;
        self.inner.expire(key, ttl).await
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_arming(key)?;
        self.inner.expire_if_unset(key, ttl).await
    }

    async fn range_sorted_set_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        self.check(key)?;
        self.inner.range_sorted_set_desc(key).await
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check(key)?;
        self.inner.hash_fields(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.check(key)?;
        self.inner.ttl(key).await
    }
}

/// Store whose reads never complete, like a connection that stopped answering.
pub struct StalledStore;

#[async_trait]
impl LeaderboardStore for StalledStore {
    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn incr_sorted_set(&self, _: &str, _: &str, _: f64) -> Result<f64, StoreError> {
        std::future::pending().await
    }

    async fn set_hash_fields(&self, _: &str, _: &[(&str, String)]) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn expire_if_unset(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn range_sorted_set_desc(&self, _: &str) -> Result<Vec<(String, f64)>, StoreError> {
        std::future::pending().await
    }

    async fn hash_fields(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
        std::future::pending().await
    }

    async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
        std::future::pending().await
    }
}
