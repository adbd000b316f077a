use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::aggregation::{AggregationEngine, ScoreWrite, WriteReport};
use crate::contributions::{ContributionRecorder, RecordWrite};
use crate::keys::{KeyError, Scope};
use crate::shared::{AppState, LeaderboardError};

/// Configuration for the synthetic ingestion run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Total events across all workers
    pub contributions: usize,
    pub workers: usize,
    /// Distinct users; event `i` belongs to `user{i % users}`
    pub users: usize,
    /// Projects picked at random per event; empty means global-only events
    pub projects: Vec<String>,
    /// Scores are drawn from `1..=max_score`
    pub max_score: i64,
    /// Sleep between events of one worker
    pub pause: Duration,
    pub max_retries: u32,
    /// First retry delay, doubled on each further attempt
    pub retry_backoff: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            contributions: 100_000,
            workers: 10,
            users: 100,
            projects: (1..=5).map(|n| format!("project{n}")).collect(),
            max_score: 10,
            pause: Duration::from_millis(90),
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// One scored contribution as submitted by a contributor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionEvent {
    pub scope: Scope,
    pub user_id: String,
    pub contribution_id: String,
    pub score: i64,
    pub display_name: String,
}

impl ContributionEvent {
    /// Deterministic identity for event `index`, random project and score.
    pub fn synthetic<R: Rng>(
        index: usize,
        config: &IngestConfig,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        let user_id = format!("user{}", index % config.users.max(1));
        let scope = if config.projects.is_empty() {
            Scope::Global
        } else {
            Scope::project(config.projects[rng.random_range(0..config.projects.len())].clone())?
        };

        Ok(Self {
            scope,
            display_name: format!("Team Member {user_id}"),
            contribution_id: format!("contrib{index:06}"),
            score: rng.random_range(1..=config.max_score.max(1)),
            user_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Events accepted by the write path
    pub events: usize,
    /// Events refused before any write (invalid identifiers or scores)
    pub rejected: usize,
    pub total_score: i64,
    /// Key writes still failing after all retries
    pub failed_writes: usize,
    pub elapsed_ms: u64,
}

impl IngestSummary {
    fn merge(&mut self, other: &IngestSummary) {
        self.events += other.events;
        self.rejected += other.rejected;
        self.total_score += other.total_score;
        self.failed_writes += other.failed_writes;
    }
}

/// Fans `config.contributions` synthetic events out over `config.workers` tasks.
#[instrument(skip(state, config), fields(contributions = config.contributions, workers = config.workers))]
pub async fn run_ingestion(state: AppState, config: IngestConfig) -> IngestSummary {
    let started = Instant::now();
    let workers = config.workers.max(1);
    let total = config.contributions;

    info!("Starting ingestion");

    let handles = (0..workers).map(|worker| {
        let state = state.clone();
        let config = config.clone();
        let start = worker * total / workers;
        let end = (worker + 1) * total / workers;
        tokio::spawn(async move { run_worker(&state, &config, start..end).await })
    });

    let mut summary = IngestSummary::default();
    for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(partial) => summary.merge(&partial),
            Err(err) => error!(worker, error = %err, "Ingestion worker panicked"),
        }
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        events = summary.events,
        failed_writes = summary.failed_writes,
        elapsed_ms = summary.elapsed_ms,
        "Ingestion finished"
    );
    summary
}

async fn run_worker(
    state: &AppState,
    config: &IngestConfig,
    range: std::ops::Range<usize>,
) -> IngestSummary {
    let mut rng = StdRng::from_os_rng();
    let mut summary = IngestSummary::default();

    for index in range {
        let event = match ContributionEvent::synthetic(index, config, &mut rng) {
            Ok(event) => event,
            Err(err) => {
                warn!(index, error = %err, "Skipping malformed synthetic event");
                summary.rejected += 1;
                continue;
            }
        };

        match ingest_event(&state.engine, &state.recorder, &event, config, &Utc::now()).await {
            Ok(failed) => {
                summary.events += 1;
                summary.total_score += event.score;
                summary.failed_writes += failed;
            }
            Err(err) => {
                warn!(contribution_id = %event.contribution_id, error = %err, "Event rejected");
                summary.rejected += 1;
            }
        }

        if !config.pause.is_zero() {
            tokio::time::sleep(config.pause).await;
        }
    }

    summary
}

/// Writes one event's scores and records, retrying transient failures with
/// exponential backoff. Returns the number of key writes that never succeeded.
///
/// Every key is planned before the first write, so an invalid event leaves no
/// trace in the store.
pub async fn ingest_event(
    engine: &AggregationEngine,
    recorder: &ContributionRecorder,
    event: &ContributionEvent,
    config: &IngestConfig,
    now: &DateTime<Utc>,
) -> Result<usize, LeaderboardError> {
    let score_writes = AggregationEngine::plan(&event.scope, &event.user_id, event.score, now)?;
    let record_writes = ContributionRecorder::plan(
        &event.scope,
        &event.user_id,
        &event.contribution_id,
        event.score,
        &event.display_name,
        now,
    )?;

    let scores = engine.execute(score_writes).await;
    let records = recorder.execute(record_writes).await;

    let scores = settle_scores(engine, scores, config).await;
    let records = settle_records(recorder, records, config).await;

    let failed = scores.failure_count() + records.failure_count();
    if failed > 0 {
        warn!(
            contribution_id = %event.contribution_id,
            failed,
            "Giving up on key writes after retries"
        );
    }
    Ok(failed)
}

async fn settle_scores(
    engine: &AggregationEngine,
    mut report: WriteReport<ScoreWrite>,
    config: &IngestConfig,
) -> WriteReport<ScoreWrite> {
    let mut backoff = config.retry_backoff;
    for _ in 0..config.max_retries {
        if !report.has_retryable_failures() {
            break;
        }
        tokio::time::sleep(backoff).await;
        backoff *= 2;
        report = engine.retry(&report).await;
    }
    report
}

async fn settle_records(
    recorder: &ContributionRecorder,
    mut report: WriteReport<RecordWrite>,
    config: &IngestConfig,
) -> WriteReport<RecordWrite> {
    let mut backoff = config.retry_backoff;
    for _ in 0..config.max_retries {
        if !report.has_retryable_failures() {
            break;
        }
        tokio::time::sleep(backoff).await;
        backoff *= 2;
        report = recorder.retry(&report).await;
    }
    report
}
