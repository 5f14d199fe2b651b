//! Timestamp encoding shared by both dialects.
//!
//! Timestamps are stored as RFC 3339 UTC text with microsecond precision so the
//! same statements bind identically against PostgreSQL and SQLite, and so text
//! ordering matches chronological ordering.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};

use crate::StoreError;

/// Current time truncated to the precision the database keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn encode(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 as written by [`encode`], plus the bare
/// `YYYY-MM-DD HH:MM:SS[.ffffff]` form that rows edited by hand tend to carry.
pub fn decode(column: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let source = match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(err) => err,
    };

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Timestamp { column, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_utc_micros() {
        let ts = DateTime::parse_from_rfc3339("2025-10-29T17:28:13.123456789+02:00")
            .unwrap()
            .with_timezone(&Utc)
            .trunc_subsecs(6);
        assert_eq!(encode(&ts), "2025-10-29T15:28:13.123456Z");
    }

    #[test]
    fn decode_round_trips_encoded_value() {
        let ts = now();
        assert_eq!(decode("created_at", &encode(&ts)).unwrap(), ts);
    }

    #[test]
    fn decode_accepts_plain_sql_format() {
        let dt = decode("created_at", "2025-10-29 17:28:13").unwrap();
        assert_eq!(encode(&dt), "2025-10-29T17:28:13.000000Z");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode("updated_at", "yesterday").unwrap_err();
        let rfc3339 = DateTime::parse_from_rfc3339("yesterday").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timestamp { column: "updated_at", source } if source == rfc3339
        ));
    }

    #[test]
    fn encoded_text_sorts_chronologically() {
        let earlier = decode("t", "2025-01-02T03:04:05Z").unwrap();
        let later = decode("t", "2025-01-02T03:04:05.000001Z").unwrap();
        assert!(encode(&earlier) < encode(&later));
    }
}
