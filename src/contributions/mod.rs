use chrono::{DateTime, TimeZone};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::aggregation::{
    arm_only, write_and_arm, TtlArming, WriteFailure, WriteOutcome, WriteReport, WriteResult,
    DEFAULT_DEADLINE,
};
use crate::keys::{self, Scope};
use crate::period::{Period, Timeframe};
use crate::shared::LeaderboardError;
use crate::store::{with_deadline, LeaderboardStore};

/// Denormalized snapshot of one contribution within one timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionRecord {
    pub name: String,
    pub project: String,
    pub timeframe: Timeframe,
    pub period: String,
    pub user_id: String,
    pub score: i64,
    pub contribution_id: String,
}

impl ContributionRecord {
    /// Hash fields as stored.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("project", self.project.clone()),
            ("timeframe", self.timeframe.to_string()),
            ("period", self.period.clone()),
            ("user_id", self.user_id.clone()),
            ("score", self.score.to_string()),
            ("contribute_id", self.contribution_id.clone()),
        ]
    }

    /// Rebuilds a record from stored fields; `None` if any field is missing or malformed.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            name: fields.get("name")?.clone(),
            project: fields.get("project")?.clone(),
            timeframe: fields.get("timeframe")?.parse().ok()?,
            period: fields.get("period")?.clone(),
            user_id: fields.get("user_id")?.clone(),
            score: fields.get("score")?.parse().ok()?,
            contribution_id: fields.get("contribute_id")?.clone(),
        })
    }
}

/// One planned record write.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    pub key: String,
    pub record: ContributionRecord,
    pub ttl: Duration,
}

/// Write path for full contribution records, one per timeframe.
pub struct ContributionRecorder {
    store: Arc<dyn LeaderboardStore>,
    ttl_arming: TtlArming,
    deadline: Duration,
}

impl ContributionRecorder {
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

    pub fn plan<Tz: TimeZone>(
        scope: &Scope,
        user_id: &str,
        contribution_id: &str,
        score: i64,
        display_name: &str,
        now: &DateTime<Tz>,
    ) -> Result<Vec<RecordWrite>, LeaderboardError> {
        if score <= 0 {
            return Err(LeaderboardError::InvalidScore(score));
        }

        Period::resolve_all(now)
            .into_iter()
            .map(|period| -> Result<RecordWrite, LeaderboardError> {
                let key = keys::contribution_key(
                    scope,
                    period.timeframe,
                    &period.label,
                    user_id,
                    contribution_id,
                )?;
                Ok(RecordWrite {
                    key,
                    record: ContributionRecord {
                        name: display_name.to_string(),
                        project: scope.to_string(),
                        timeframe: period.timeframe,
                        period: period.label,
                        user_id: user_id.to_string(),
                        score,
                        contribution_id: contribution_id.to_string(),
                    },
                    ttl: period.remaining,
                })
            })
            .collect()
    }

    /// Writes the contribution's record for each timeframe. Rewriting the same
    /// contribution with the same payload is a no-op; a different payload
    /// overwrites the previous snapshot.
    #[instrument(skip(self, scope, display_name, now), fields(scope = %scope))]
    pub async fn record_contribution<Tz: TimeZone>(
        &self,
        scope: &Scope,
        user_id: &str,
        contribution_id: &str,
        score: i64,
        display_name: &str,
        now: &DateTime<Tz>,
    ) -> Result<WriteReport<RecordWrite>, LeaderboardError> {
        let writes = Self::plan(scope, user_id, contribution_id, score, display_name, now)?;
        Ok(self.execute(writes).await)
    }

    /// Applies writes produced by [`ContributionRecorder::plan`].
    pub async fn execute(&self, writes: Vec<RecordWrite>) -> WriteReport<RecordWrite> {
        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            let result = self.apply(&write).await;
            results.push(Self::checked(write, result));
        }
        WriteReport { results }
    }

    /// Finishes failed record writes. Records that landed without a TTL are
    /// only armed; the rest are rewritten in full.
    pub async fn retry(&self, report: &WriteReport<RecordWrite>) -> WriteReport<RecordWrite> {
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

    /// Reads back the record stored for `timeframe` in the period containing `now`.
    #[instrument(skip(self, scope, now), fields(scope = %scope))]
    pub async fn get_contribution<Tz: TimeZone>(
        &self,
        scope: &Scope,
        timeframe: Timeframe,
        user_id: &str,
        contribution_id: &str,
        now: &DateTime<Tz>,
    ) -> Result<Option<ContributionRecord>, LeaderboardError> {
        let period = Period::resolve(timeframe, now);
        let key =
            keys::contribution_key(scope, timeframe, &period.label, user_id, contribution_id)?;

        let fields = with_deadline(self.deadline, self.store.hash_fields(&key)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let record = ContributionRecord::from_fields(&fields);
        if record.is_none() {
            warn!(key = %key, "Stored contribution record is incomplete");
        }
        Ok(record)
    }

    fn checked(
        write: RecordWrite,
        result: Result<WriteOutcome, WriteFailure>,
    ) -> WriteResult<RecordWrite> {
        if let Err(err) = &result {
            warn!(
                key = %write.key,
                timeframe = %write.record.timeframe,
                error = %err,
                "Failed to write contribution record"
            );
        }
        WriteResult { write, result }
    }

    async fn apply(&self, write: &RecordWrite) -> Result<WriteOutcome, WriteFailure> {
        let fields = write.record.to_fields();
        let ((), ttl_armed) = write_and_arm(
            self.store.as_ref(),
            self.ttl_arming,
            self.deadline,
            &write.key,
            write.ttl,
            self.store.set_hash_fields(&write.key, &fields),
        )
        .await?;

        debug!(key = %write.key, ttl_armed, "Contribution recorded");

        Ok(WriteOutcome {
            new_score: None,
            ttl_armed,
        })
    }

    async fn arm(&self, write: &RecordWrite) -> Result<WriteOutcome, WriteFailure> {
        let ttl_armed = arm_only(
            self.store.as_ref(),
            self.ttl_arming,
            self.deadline,
            &write.key,
            write.ttl,
        )
        .await?;

        Ok(WriteOutcome {
            new_score: None,
            ttl_armed,
        })
    }
}
