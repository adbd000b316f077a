use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone};
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// Smallest TTL ever handed to the store.
pub const MIN_REMAINING: Duration = Duration::from_secs(1);

/// Recurrence unit of a ranking window.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Timeframe {
    Year,
    Month,
    Week,
}

impl Timeframe {
    /// All timeframes in write order (year, month, week).
    pub fn all() -> Vec<Timeframe> {
        Timeframe::iter().collect()
    }
}

/// One concrete instance of a timeframe, resolved from a single instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub timeframe: Timeframe,
    pub label: String,
    /// Time left until the period boundary, used as the key TTL.
    pub remaining: Duration,
}

impl Period {
    /// Resolves label and remaining duration from the same `now` snapshot.
    pub fn resolve<Tz: TimeZone>(timeframe: Timeframe, now: &DateTime<Tz>) -> Self {
        Self {
            timeframe,
            label: label(timeframe, now),
            remaining: remaining(timeframe, now),
        }
    }

    /// Resolves every timeframe against one instant.
    pub fn resolve_all<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<Period> {
        Timeframe::iter()
            .map(|timeframe| Period::resolve(timeframe, now))
            .collect()
    }
}

/// Canonical label: `YYYY`, `YYYY-MM` or ISO-8601 `YYYY-Www`.
pub fn label<Tz: TimeZone>(timeframe: Timeframe, now: &DateTime<Tz>) -> String {
    match timeframe {
        Timeframe::Year => format!("{:04}", now.year()),
        Timeframe::Month => format!("{:04}-{:02}", now.year(), now.month()),
        Timeframe::Week => {
            let week = now.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
    }
}

/// Duration until the next boundary of `timeframe`, in `now`'s timezone.
pub fn remaining<Tz: TimeZone>(timeframe: Timeframe, now: &DateTime<Tz>) -> Duration {
    let boundary = next_boundary(timeframe, now);
    let until = boundary.signed_duration_since(now.clone());

    match until.to_std() {
        Ok(duration) if duration >= MIN_REMAINING => duration,
        _ => MIN_REMAINING,
    }
}

fn next_boundary<Tz: TimeZone>(timeframe: Timeframe, now: &DateTime<Tz>) -> DateTime<Tz> {
    let today = now.date_naive();

    let boundary_date = match timeframe {
        Timeframe::Year => NaiveDate::from_ymd_opt(today.year() + 1, 1, 1),
        Timeframe::Month => {
            if today.month() == 12 {
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
            }
        }
        Timeframe::Week => {
            // Always 1..=7 days ahead, so a Monday midnight yields a full week.
            let days_ahead = 7 - i64::from(today.weekday().num_days_from_monday());
            today.checked_add_signed(ChronoDuration::days(days_ahead))
        }
    };

    let Some(midnight) = boundary_date.and_then(|date| date.and_hms_opt(0, 0, 0)) else {
        return now.clone() + ChronoDuration::seconds(MIN_REMAINING.as_secs() as i64);
    };

    let tz = now.timezone();
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}
