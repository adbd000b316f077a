// Library crate for periodized leaderboards
// This file exposes the public API for the binary and integration tests

pub mod aggregation;
pub mod config;
pub mod contributions;
pub mod ingest;
pub mod keys;
pub mod period;
pub mod reader;
pub mod shared;
pub mod store;
pub mod viewer;

// Re-export commonly used types for easier access in tests
pub use aggregation::{AggregationEngine, TtlArming, WriteFailure, WriteOutcome, WriteReport};
pub use config::{AppConfig, StoreConfig};
pub use contributions::{ContributionRecord, ContributionRecorder};
pub use ingest::{run_ingestion, ContributionEvent, IngestConfig, IngestSummary};
pub use keys::{KeyError, Scope};
pub use period::{Period, Timeframe};
pub use reader::{LeaderboardReader, RankedEntry};
pub use shared::{AppState, LeaderboardError};
pub use store::{InMemoryStore, LeaderboardStore, RedisStore, StoreError};
pub use viewer::{run_viewer, ViewerConfig};
