//! Query window resolution.
//!
//! A window is a half-open UTC interval `[start, end)`. It is produced
//! either from a relative period token resolved against "now" (dashboard
//! queries) or from an explicit pair of calendar bounds (app queries).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::EngineError;

/// Period token applied when the requested one is not recognized.
pub const DEFAULT_PERIOD: &str = "1h";

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Resolves a relative period token against `now`.
    ///
    /// Unknown tokens fall back to [`DEFAULT_PERIOD`] rather than failing,
    /// so a stale dashboard link still renders something sensible.
    pub fn relative(token: &str, now: DateTime<Utc>) -> Self {
        let duration = period_duration(token).unwrap_or_else(|| {
            tracing::debug!(token, fallback = DEFAULT_PERIOD, "unknown period token");
            period_duration(DEFAULT_PERIOD).expect("default period is known")
        });
        Self {
            start: now - duration,
            end: now,
        }
    }

    /// Resolves an explicit start/end pair.
    ///
    /// Each bound accepts either a calendar date (`YYYY-MM-DD`) or an
    /// RFC 3339 timestamp. A date-only end bound is advanced one day so the
    /// interval covers the entire end date; `start == end` on the same
    /// calendar date therefore yields that full day.
    pub fn explicit(start: &str, end: &str) -> Result<Self, EngineError> {
        let start_dt = parse_bound(start)?.at_start_of_day();
        let end_dt = parse_bound(end)?.at_end_exclusive();

        if start_dt >= end_dt {
            return Err(EngineError::invalid_window(format!(
                "start {start_dt} must be before end {end_dt}"
            )));
        }

        Ok(Self {
            start: start_dt,
            end: end_dt,
        })
    }

    /// True when `t` falls inside `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// A parsed window bound, remembering whether the caller gave a bare date.
enum Bound {
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Bound {
    fn at_start_of_day(self) -> DateTime<Utc> {
        match self {
            Bound::Date(d) => d.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc(),
            Bound::Timestamp(t) => t,
        }
    }

    fn at_end_exclusive(self) -> DateTime<Utc> {
        match self {
            // Advance to the next midnight: end-exclusive, whole-day coverage.
            Bound::Date(d) => {
                let next = d + Duration::days(1);
                next.and_hms_opt(0, 0, 0).expect("midnight exists").and_utc()
            }
            Bound::Timestamp(t) => t,
        }
    }
}

fn parse_bound(raw: &str) -> Result<Bound, EngineError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Bound::Date(date));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Bound::Timestamp(ts.with_timezone(&Utc)));
    }
    Err(EngineError::invalid_window(format!(
        "cannot parse bound {raw:?} (expected YYYY-MM-DD or RFC 3339)"
    )))
}

/// True when `token` names a supported relative period.
pub fn known_period(token: &str) -> bool {
    period_duration(token).is_some()
}

/// Maps a period token to its duration. `None` for unknown tokens.
fn period_duration(token: &str) -> Option<Duration> {
    let d = match token {
        "1m" => Duration::minutes(1),
        "5m" => Duration::minutes(5),
        "15m" => Duration::minutes(15),
        "30m" => Duration::minutes(30),
        "1h" => Duration::hours(1),
        "6h" => Duration::hours(6),
        "12h" => Duration::hours(12),
        "24h" => Duration::hours(24),
        "7d" => Duration::days(7),
        "30d" => Duration::days(30),
        _ => return None,
    };
    Some(d)
}
