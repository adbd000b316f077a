use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use leaderboard::{AppState, InMemoryStore, LeaderboardStore, Scope, Timeframe, TtlArming};

use super::mocks::{FailOn, FailingStore};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// Wednesday of ISO week 2024-W11.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
}

pub struct TestSetup {
    /// Backing store, always reachable even when the app sees failures.
    pub memory: Arc<InMemoryStore>,
    pub failing: Option<Arc<FailingStore>>,
    pub state: AppState,
}

pub struct TestSetupBuilder {
    ttl_arming: TtlArming,
    deadline: Duration,
    failure: Option<(String, FailOn, usize)>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            ttl_arming: TtlArming::OnCreation,
            deadline: Duration::from_secs(1),
            failure: None,
        }
    }

    pub fn with_ttl_arming(mut self, ttl_arming: TtlArming) -> Self {
        self.ttl_arming = ttl_arming;
        self
    }

    /// Fails the next `failures` calls on keys containing `pattern`.
    pub fn failing_on(mut self, pattern: &str, failures: usize) -> Self {
        self.failure = Some((pattern.to_string(), FailOn::Every, failures));
        self
    }

    /// Fails only the next `failures` expiration calls on keys containing
    /// `pattern`; the writes before them still land.
    pub fn failing_arming_on(mut self, pattern: &str, failures: usize) -> Self {
        self.failure = Some((pattern.to_string(), FailOn::Arming, failures));
        self
    }

    pub fn build(self) -> TestSetup {
        let memory = Arc::new(InMemoryStore::new());
        let failing = self
            .failure
            .map(|(pattern, fail_on, failures)| {
                Arc::new(FailingStore::new(memory.clone(), &pattern, fail_on, failures))
            });

        let store: Arc<dyn LeaderboardStore> = match &failing {
            Some(failing) => failing.clone() as Arc<dyn LeaderboardStore>,
            None => memory.clone(),
        };

        TestSetup {
            state: AppState::new(store, self.ttl_arming, self.deadline),
            memory,
            failing,
        }
    }
}

impl TestSetup {
    /// `(member, score)` pairs of the current ranking at [`fixed_now`].
    pub async fn ranking(&self, scope: &Scope, timeframe: Timeframe) -> Vec<(String, i64)> {
        self.state
            .reader
            .rank(scope, timeframe, &fixed_now())
            .await
            .unwrap()
            .into_iter()
            .map(|entry| (entry.member, entry.score))
            .collect()
    }

    pub async fn record(&self, scope: &Scope, user_id: &str, score: i64) {
        let report = self
            .state
            .engine
            .record_score(scope, user_id, score, &fixed_now())
            .await
            .unwrap();
        assert!(report.is_complete());
    }
}
