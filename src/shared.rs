use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::aggregation::{AggregationEngine, TtlArming};
use crate::config::AppConfig;
use crate::contributions::ContributionRecorder;
use crate::keys::KeyError;
use crate::reader::LeaderboardReader;
use crate::store::{LeaderboardStore, StoreError};

/// Shared application state: one store handle injected into every component.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeaderboardStore>,
    pub engine: Arc<AggregationEngine>,
    pub recorder: Arc<ContributionRecorder>,
    pub reader: Arc<LeaderboardReader>,
}

impl AppState {
    pub fn new(store: Arc<dyn LeaderboardStore>, ttl_arming: TtlArming, deadline: Duration) -> Self {
        Self {
            engine: Arc::new(
                AggregationEngine::new(store.clone())
                    .with_ttl_arming(ttl_arming)
                    .with_deadline(deadline),
            ),
            recorder: Arc::new(
                ContributionRecorder::new(store.clone())
                    .with_ttl_arming(ttl_arming)
                    .with_deadline(deadline),
            ),
            reader: Arc::new(LeaderboardReader::new(store.clone()).with_deadline(deadline)),
            store,
        }
    }

    pub fn from_config(store: Arc<dyn LeaderboardStore>, config: &AppConfig) -> Self {
        Self::new(store, config.ttl_arming, config.store_deadline)
    }
}

#[derive(Error, Debug)]
pub enum LeaderboardError {
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Invalid score {0}: scores must be positive")]
    InvalidScore(i64),

    /// The store could not serve the request; distinct from an empty ranking.
    #[error("Leaderboard unavailable: {0}")]
    Unavailable(#[from] StoreError),
}
