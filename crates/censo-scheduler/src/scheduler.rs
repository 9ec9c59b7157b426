//! Timestamp encoding shared by the job queue and the record store.
//!
//! Due checks are done in SQL by comparing these strings, so the format must
//! stay fixed-width.

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width UTC RFC 3339 timestamp; these sort correctly as text.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Returns `None` for anything that is not RFC 3339.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
