use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::aggregation::DEFAULT_DEADLINE;
use crate::keys::{self, Scope};
use crate::period::{Period, Timeframe};
use crate::shared::LeaderboardError;
use crate::store::{with_deadline, LeaderboardStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    /// 1-based position.
    pub rank: usize,
    pub member: String,
    pub score: i64,
}

/// Read path: the current period's ranking for a scope and timeframe.
pub struct LeaderboardReader {
    store: Arc<dyn LeaderboardStore>,
    deadline: Duration,
}

impl LeaderboardReader {
    pub fn new(store: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            store,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Members by descending score. Ties follow the store's own ordering
    /// (reverse member order for Redis), which this crate does not guarantee.
    ///
    /// A period with no contributions yet yields an empty vec; a store failure
    /// yields [`LeaderboardError::Unavailable`].
    #[instrument(skip(self, scope, now), fields(scope = %scope, timeframe = %timeframe))]
    pub async fn rank<Tz: TimeZone>(
        &self,
        scope: &Scope,
        timeframe: Timeframe,
        now: &DateTime<Tz>,
    ) -> Result<Vec<RankedEntry>, LeaderboardError> {
        let period = Period::resolve(timeframe, now);
        let key = keys::ranking_key(scope, timeframe, &period.label)?;

        let members = with_deadline(self.deadline, self.store.range_sorted_set_desc(&key))
            .await
            .map_err(|err| {
                warn!(key = %key, error = %err, "Failed to read ranking");
                err
            })?;

        debug!(key = %key, count = members.len(), "Ranking loaded");

        Ok(members
            .into_iter()
            .enumerate()
            .map(|(index, (member, score))| RankedEntry {
                rank: index + 1,
                member,
                score: score.round() as i64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationEngine;
    use crate::store::{InMemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    /// Store whose every call fails as if the connection dropped.
    struct BrokenStore;

    #[async_trait]
    impl LeaderboardStore for BrokenStore {
        async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn incr_sorted_set(&self, _: &str, _: &str, _: f64) -> Result<f64, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn set_hash_fields(&self, _: &str, _: &[(&str, String)]) -> Result<(), StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn expire_if_unset(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn range_sorted_set_desc(&self, _: &str) -> Result<Vec<(String, f64)>, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn hash_fields(&self, _: &str) -> Result<HashMap<String, String>, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_period_is_not_an_error() {
        let reader = LeaderboardReader::new(Arc::new(InMemoryStore::new()));
        let ranked = reader
            .rank(&Scope::Global, Timeframe::Week, &now())
            .await
            .unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_ranks_descending_within_scope() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AggregationEngine::new(store.clone());
        let reader = LeaderboardReader::new(store);
        let scope = Scope::project("project2").unwrap();

        engine.record_score(&scope, "u1", 4, &now()).await.unwrap();
        engine.record_score(&scope, "u2", 9, &now()).await.unwrap();

        let ranked = reader.rank(&scope, Timeframe::Month, &now()).await.unwrap();
        assert_eq!(
            ranked,
            vec![
                RankedEntry {
                    rank: 1,
                    member: "u2".to_string(),
                    score: 9
                },
                RankedEntry {
                    rank: 2,
                    member: "u1".to_string(),
                    score: 4
                },
            ]
        );

        // The project writes also landed in the global ranking
        let global = reader
            .rank(&Scope::Global, Timeframe::Month, &now())
            .await
            .unwrap();
        assert_eq!(global.len(), 2);
        assert!(reader
            .rank(&Scope::project("project3").unwrap(), Timeframe::Month, &now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let reader = LeaderboardReader::new(Arc::new(BrokenStore));
        let result = reader.rank(&Scope::Global, Timeframe::Year, &now()).await;
        assert!(matches!(
            result,
            Err(LeaderboardError::Unavailable(StoreError::Connection(_)))
        ));
    }
}
