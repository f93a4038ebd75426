//! Server timestamps come as `YYYY-MM-DD HH:MM:SS` with no zone; they are UTC.

use chrono::{DateTime, Utc};

use crate::error::{ClientError, Result};

/// ISO-8601 form of a server timestamp, tagged `Z` when it carries no zone.
pub fn normalize_timestamp(raw: &str) -> String {
    let iso = raw.replacen(' ', "T", 1);
    if has_zone(&iso) {
        iso
    } else {
        format!("{}Z", iso)
    }
}

/// Parse a server timestamp as an absolute instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let normalized = normalize_timestamp(raw);
    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ClientError::Decode(format!("bad timestamp '{}': {}", raw, e)))
}

fn has_zone(iso: &str) -> bool {
    if iso.ends_with('Z') || iso.ends_with('z') || iso.contains('+') {
        return true;
    }
    // A '-' after the time separator is a negative offset, not a date dash.
    match iso.find('T') {
        Some(t) => iso[t..].contains('-'),
        None => false,
    }
}
