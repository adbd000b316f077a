pub mod engine;

pub use engine::{AggregationEngine, ScoreWrite};

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::store::{with_deadline, LeaderboardStore, StoreError};

/// Default upper bound for one store round trip.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(2);

/// How a key receives its end-of-period expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtlArming {
    /// Atomic `expire if no TTL yet` after every write. Concurrent first
    /// writers cannot double-arm or extend the TTL.
    #[default]
    OnCreation,
    /// Existence check before the write, expire only if the key was absent.
    /// Racy under concurrent first writers; for stores without `NX` support.
    CheckThenSet,
}

impl fmt::Display for TtlArming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtlArming::OnCreation => write!(f, "nx"),
            TtlArming::CheckThenSet => write!(f, "check"),
        }
    }
}

impl FromStr for TtlArming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nx" | "on-creation" => Ok(TtlArming::OnCreation),
            "check" | "check-then-set" => Ok(TtlArming::CheckThenSet),
            _ => Err(s.to_string()),
        }
    }
}

/// Outcome of one successful key write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteOutcome {
    /// Member score after the write, for sorted-set writes.
    pub new_score: Option<f64>,
    pub ttl_armed: bool,
}

/// Why a key write did not complete.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteFailure {
    /// The write was not confirmed; retry replays it.
    #[error("write failed: {0}")]
    Write(StoreError),
    /// The write landed but its expiration was not armed. Only arming may be
    /// repeated, since the write itself may not be idempotent.
    #[error("write applied, expiration not armed: {0}")]
    Arm(StoreError),
}

impl WriteFailure {
    pub fn error(&self) -> &StoreError {
        match self {
            WriteFailure::Write(err) | WriteFailure::Arm(err) => err,
        }
    }

    pub fn write_applied(&self) -> bool {
        matches!(self, WriteFailure::Arm(_))
    }
}

#[derive(Debug)]
pub struct WriteResult<W> {
    pub write: W,
    pub result: Result<WriteOutcome, WriteFailure>,
}

/// Per-key results of one event. Failures on one key never stop the others.
#[derive(Debug)]
pub struct WriteReport<W> {
    pub results: Vec<WriteResult<W>>,
}

impl<W> WriteReport<W> {
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&W, &WriteFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|failure| (&r.write, failure)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Transient failures only; command errors will fail again on retry.
    pub fn has_retryable_failures(&self) -> bool {
        self.failures()
            .any(|(_, failure)| failure.error().is_transient())
    }

    pub fn armed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.result, Ok(WriteOutcome { ttl_armed: true, .. })))
            .count()
    }
}

/// Runs `write` against `key` and arms `ttl` per `policy`.
/// Returns the write's value and whether this call armed the TTL.
pub(crate) async fn write_and_arm<T, F>(
    store: &dyn LeaderboardStore,
    policy: TtlArming,
    deadline: Duration,
    key: &str,
    ttl: Duration,
    write: F,
) -> Result<(T, bool), WriteFailure>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let existed = match policy {
        TtlArming::CheckThenSet => Some(
            with_deadline(deadline, store.exists(key))
                .await
                .map_err(WriteFailure::Write)?,
        ),
        TtlArming::OnCreation => None,
    };

    let value = with_deadline(deadline, write)
        .await
        .map_err(WriteFailure::Write)?;

    let armed = match existed {
        Some(true) => Ok(false),
        Some(false) => with_deadline(deadline, store.expire(key, ttl)).await,
        None => with_deadline(deadline, store.expire_if_unset(key, ttl)).await,
    }
    .map_err(WriteFailure::Arm)?;

    Ok((value, armed))
}

/// Arms `ttl` on a key whose write already landed.
///
/// Under `CheckThenSet` an arming failure only happens for the writer that
/// found the key absent, so the unconditional expire is still its to set.
pub(crate) async fn arm_only(
    store: &dyn LeaderboardStore,
    policy: TtlArming,
    deadline: Duration,
    key: &str,
    ttl: Duration,
) -> Result<bool, WriteFailure> {
    match policy {
        TtlArming::OnCreation => with_deadline(deadline, store.expire_if_unset(key, ttl)).await,
        TtlArming::CheckThenSet => with_deadline(deadline, store.expire(key, ttl)).await,
    }
    .map_err(WriteFailure::Arm)
}
