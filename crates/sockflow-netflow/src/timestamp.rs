//! Human-readable flow timestamps.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use sockflow_common::constants::{COLLECTOR_TIME_FORMAT, DEFAULT_FLOW_WINDOW_SECS, EXPORT_TIME_FORMAT};

/// Placeholder written for an unset time.
pub const UNKNOWN_TIME: &str = "unknown";

/// Parses a timestamp in either accepted format, interpreted as UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    [EXPORT_TIME_FORMAT, COLLECTOR_TIME_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Converts epoch seconds, treating `0` and out-of-range values as unset.
#[must_use]
pub fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Renders an epoch time for export documents, `unknown` when unset.
#[must_use]
pub fn format_epoch(secs: i64) -> String {
    from_epoch(secs).map_or_else(|| UNKNOWN_TIME.to_owned(), format_time)
}

/// Renders a time in the export format.
#[must_use]
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(EXPORT_TIME_FORMAT).to_string()
}

/// Fills in a missing switched time with the default window ending at
/// `now`. A missing start becomes `now - 300s`, a missing end becomes `now`.
#[must_use]
pub fn switched_window(
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let window = TimeDelta::try_seconds(DEFAULT_FLOW_WINDOW_SECS).unwrap_or_default();
    (first.unwrap_or(now - window), last.unwrap_or(now))
}
