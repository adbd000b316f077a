use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::{LeaderboardStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    SortedSet(HashMap<String, f64>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

/// In-process store with the same observable semantics as the Redis commands
/// the core relies on, including lazy expiry and `NX` arming.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    expirations_armed: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            expirations_armed: AtomicUsize::new(0),
        }
    }

    /// Number of expire calls that actually set a TTL since creation.
    pub fn expirations_armed(&self) -> usize {
        self.expirations_armed.load(Ordering::SeqCst)
    }

    /// Live keys in sorted order.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Removes an expired entry so writes start from a fresh key.
    fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            debug!(key = %key, "Dropping expired key");
            entries.remove(key);
        }
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryStore {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .is_some_and(|entry| entry.is_live(Instant::now())))
    }

    #[instrument(skip(self))]
    async fn incr_sorted_set(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(HashMap::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::SortedSet(members) => {
                let score = members.entry(member.to_string()).or_insert(0.0);
                *score += delta;
                debug!(key = %key, member = %member, score = *score, "Incremented member");
                Ok(*score)
            }
            Value::Hash(_) => Err(wrong_type(key)),
        }
    }

    #[instrument(skip(self, fields))]
    async fn set_hash_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });

        match &mut entry.value {
            Value::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert((*field).to_string(), value.clone());
                }
                debug!(key = %key, field_count = fields.len(), "Wrote hash fields");
                Ok(())
            }
            Value::SortedSet(_) => Err(wrong_type(key)),
        }
    }

    #[instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key, now);

        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                self.expirations_armed.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, key, now);

        match entries.get_mut(key) {
            Some(entry) if entry.expires_at.is_none() => {
                entry.expires_at = Some(now + ttl);
                self.expirations_armed.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn range_sorted_set_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(key).filter(|e| e.is_live(Instant::now())) else {
            return Ok(Vec::new());
        };

        match &entry.value {
            Value::SortedSet(members) => {
                let mut ranked: Vec<(String, f64)> = members
                    .iter()
                    .map(|(member, score)| (member.clone(), *score))
                    .collect();
                // Same order as ZREVRANGE: score desc, then member desc on ties
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                Ok(ranked)
            }
            Value::Hash(_) => Err(wrong_type(key)),
        }
    }

    #[instrument(skip(self))]
    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(Instant::now())) {
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    #[instrument(skip(self))]
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_increment_creates_and_accumulates() {
        let store = InMemoryStore::new();
        assert!(!store.exists("board").await.unwrap());

        assert_eq!(store.incr_sorted_set("board", "u1", 3.0).await.unwrap(), 3.0);
        assert_eq!(store.incr_sorted_set("board", "u1", 5.0).await.unwrap(), 8.0);

        assert!(store.exists("board").await.unwrap());
        assert_eq!(
            store.range_sorted_set_desc("board").await.unwrap(),
            vec![("u1".to_string(), 8.0)]
        );
    }

    #[tokio::test]
    async fn test_range_orders_by_score_then_member_descending() {
        let store = InMemoryStore::new();
        store.incr_sorted_set("board", "alice", 4.0).await.unwrap();
        store.incr_sorted_set("board", "carol", 9.0).await.unwrap();
        store.incr_sorted_set("board", "bob", 4.0).await.unwrap();

        let ranked = store.range_sorted_set_desc("board").await.unwrap();
        let members: Vec<&str> = ranked.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["carol", "bob", "alice"]);
    }

    #[tokio::test]
    async fn test_range_of_missing_key_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.range_sorted_set_desc("nope").await.unwrap().is_empty());
        assert!(store.hash_fields("nope").await.unwrap().is_empty());
        assert_eq!(store.ttl("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_if_unset_arms_only_once() {
        let store = InMemoryStore::new();
        store.incr_sorted_set("board", "u1", 1.0).await.unwrap();

        assert!(store
            .expire_if_unset("board", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .expire_if_unset("board", Duration::from_secs(600))
            .await
            .unwrap());

        let ttl = store.ttl("board").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert_eq!(store.expirations_armed(), 1);
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_a_noop() {
        let store = InMemoryStore::new();
        assert!(!store.expire("ghost", Duration::from_secs(1)).await.unwrap());
        assert!(!store
            .expire_if_unset("ghost", Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(store.expirations_armed(), 0);
    }

    #[tokio::test]
    async fn test_expired_keys_disappear_and_restart_fresh() {
        let store = InMemoryStore::new();
        store.incr_sorted_set("board", "u1", 5.0).await.unwrap();
        store
            .expire("board", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!store.exists("board").await.unwrap());
        assert!(store.range_sorted_set_desc("board").await.unwrap().is_empty());

        // A write after expiry starts a new key without a TTL
        assert_eq!(store.incr_sorted_set("board", "u1", 2.0).await.unwrap(), 2.0);
        assert_eq!(store.ttl("board").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_fields_overwrite() {
        let store = InMemoryStore::new();
        store
            .set_hash_fields("rec", &[("score", "3".to_string()), ("name", "A".to_string())])
            .await
            .unwrap();
        store
            .set_hash_fields("rec", &[("score", "4".to_string())])
            .await
            .unwrap();

        let fields = store.hash_fields("rec").await.unwrap();
        assert_eq!(fields.get("score").map(String::as_str), Some("4"));
        assert_eq!(fields.get("name").map(String::as_str), Some("A"));
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_command_error() {
        let store = InMemoryStore::new();
        store.incr_sorted_set("board", "u1", 1.0).await.unwrap();

        let result = store.set_hash_fields("board", &[("a", "b".to_string())]).await;
        assert!(matches!(result, Err(StoreError::Command(_))));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.incr_sorted_set("board", "u1", 1.0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(
            store.range_sorted_set_desc("board").await.unwrap(),
            vec![("u1".to_string(), 200.0)]
        );
    }
}
