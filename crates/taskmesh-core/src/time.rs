// SPDX-License-Identifier: MIT OR Apache-2.0
//! RFC 3339 UTC timestamp helpers.
//!
//! Every timestamp on the wire is UTC with a literal `Z` suffix and
//! millisecond precision dropped to whole seconds — callers should not
//! assume sub-second precision survives a round trip.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::TaskMeshError;

/// Format `dt` as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use taskmesh_core::time::iso_z;
///
/// let dt = Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap();
/// assert_eq!(iso_z(dt), "2026-07-31T12:00:00Z");
/// ```
#[must_use]
pub fn iso_z(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp, accepting any offset but normalizing to UTC.
///
/// # Errors
///
/// Returns [`TaskMeshError::EnvelopeParseError`] if `s` is not a valid
/// RFC 3339 timestamp.
pub fn parse_iso_z(s: &str) -> Result<DateTime<Utc>, TaskMeshError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskMeshError::EnvelopeParseError(format!("invalid timestamp {s:?}: {e}")))
}

/// Compact timestamp used inside identifiers: `YYYYMMDDTHHMMSSZ`.
#[must_use]
pub fn compact_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn roundtrip() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let s = iso_z(dt);
        assert_eq!(s, "2026-01-02T03:04:05Z");
        assert_eq!(parse_iso_z(&s).unwrap(), dt);
    }

    #[test]
    fn compact_has_no_separators() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(compact_utc(dt), "20260102T030405Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_iso_z("not-a-time").is_err());
    }
}
