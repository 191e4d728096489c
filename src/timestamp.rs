//! Timestamp parsing shared by expiry checks and the `expires_at` filter.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an ISO-8601 timestamp. Offset-less values are taken as UTC,
/// matching how the store's timestamptz column reads them.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
