use chrono::{DateTime, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    arm_only, write_and_arm, TtlArming, WriteFailure, WriteOutcome, WriteReport, WriteResult,
    DEFAULT_DEADLINE,
};
use crate::keys::{self, Scope};
use crate::period::{Period, Timeframe};
use crate::shared::LeaderboardError;
use crate::store::LeaderboardStore;

/// One planned increment of a ranking key.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWrite {
    pub key: String,
    pub timeframe: Timeframe,
    pub period: String,
    pub member: String,
    pub delta: i64,
    /// Expiration to arm if this write creates the key.
    pub ttl: Duration,
}

/// Write path for scores: every event lands in the global ranking and, for a
/// project scope, in that project's ranking, for each timeframe.
pub struct AggregationEngine {
    store: Arc<dyn LeaderboardStore>,
    ttl_arming: TtlArming,
    deadline: Duration,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn LeaderboardStore>) -> Self {
        Self {
            store,
            ttl_arming: TtlArming::default(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_ttl_arming(mut self, ttl_arming: TtlArming) -> Self {
        self.ttl_arming = ttl_arming;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Resolves every key write for an event without touching the store.
    /// Fails fast on invalid identifiers or non-positive scores.
    pub fn plan<Tz: TimeZone>(
        scope: &Scope,
        user_id: &str,
        score: i64,
        now: &DateTime<Tz>,
    ) -> Result<Vec<ScoreWrite>, LeaderboardError> {
        if score <= 0 {
            return Err(LeaderboardError::InvalidScore(score));
        }
        keys::validate_user_id(user_id)?;

        let mut writes = Vec::new();
        for period in Period::resolve_all(now) {
            let mut targets = vec![keys::global_ranking_key(period.timeframe, &period.label)?];
            if let Scope::Project(project) = scope {
                targets.push(keys::scoped_ranking_key(
                    project,
                    period.timeframe,
                    &period.label,
                )?);
            }

            for key in targets {
                writes.push(ScoreWrite {
                    key,
                    timeframe: period.timeframe,
                    period: period.label.clone(),
                    member: user_id.to_string(),
                    delta: score,
                    ttl: period.remaining,
                });
            }
        }
        Ok(writes)
    }

    /// Adds `score` to `user_id` in every ranking the event belongs to.
    #[instrument(skip(self, scope, now), fields(scope = %scope))]
    pub async fn record_score<Tz: TimeZone>(
        &self,
        scope: &Scope,
        user_id: &str,
        score: i64,
        now: &DateTime<Tz>,
    ) -> Result<WriteReport<ScoreWrite>, LeaderboardError> {
        let writes = Self::plan(scope, user_id, score, now)?;
        Ok(self.execute(writes).await)
    }

    /// Applies writes produced by [`AggregationEngine::plan`].
    pub async fn execute(&self, writes: Vec<ScoreWrite>) -> WriteReport<ScoreWrite> {
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            let result = self.apply(&write).await;
            results.push(Self::checked(write, result));
        }
        WriteReport { results }
    }

    /// Finishes the failed writes of an earlier report. Increments that never
    /// landed are replayed; keys whose increment landed only get their TTL
    /// armed, so no score is ever counted twice.
    #[instrument(skip(self, report), fields(failures = report.failure_count()))]
    pub async fn retry(&self, report: &WriteReport<ScoreWrite>) -> WriteReport<ScoreWrite> {
        let mut results = Vec::new();
        for (write, failure) in report.failures() {
            let result = if failure.write_applied() {
                self.arm(write).await
            } else {
                self.apply(write).await
            };
            results.push(Self::checked(write.clone(), result));
        }
        WriteReport { results }
    }

    fn checked(
        write: ScoreWrite,
        result: Result<WriteOutcome, WriteFailure>,
    ) -> WriteResult<ScoreWrite> {
        if let Err(err) = &result {
            warn!(
                key = %write.key,
                timeframe = %write.timeframe,
                error = %err,
                "Failed to update ranking"
            );
        }
        WriteResult { write, result }
    }

    async fn apply(&self, write: &ScoreWrite) -> Result<WriteOutcome, WriteFailure> {
        let (new_score, ttl_armed) = write_and_arm(
            self.store.as_ref(),
            self.ttl_arming,
            self.deadline,
            &write.key,
            write.ttl,
            self.store
                .incr_sorted_set(&write.key, &write.member, write.delta as f64),
        )
        .await?;

        debug!(
            key = %write.key,
            member = %write.member,
            new_score,
            ttl_armed,
            "Ranking updated"
        );

        Ok(WriteOutcome {
            new_score: Some(new_score),
            ttl_armed,
        })
    }

    async fn arm(&self, write: &ScoreWrite) -> Result<WriteOutcome, WriteFailure> {
        let ttl_armed = arm_only(
            self.store.as_ref(),
            self.ttl_arming,
            self.deadline,
            &write.key,
            write.ttl,
        )
        .await?;

        debug!(key = %write.key, ttl_armed, "Ranking expiration armed");

        Ok(WriteOutcome {
            new_score: None,
            ttl_armed,
        })
    }
}
