//! Wall-clock helpers with a single canonical textual format.

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical timestamp type used across the crate.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Returns the current UTC time as an ISO-8601 string with millisecond
/// precision and a `Z` suffix.
#[must_use]
pub fn iso_timestamp() -> String {
    now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an ISO-8601 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
