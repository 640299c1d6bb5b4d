//! Julian date conversions.
//!
//! The catalog indexes alerts by Julian date (`candidate.jd`) while the
//! secondary service takes ISO timestamps, so every run converts between the
//! two. All conversions are UTC with millisecond resolution.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Julian date of 1970-01-01T00:00:00Z.
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Format used when sending window bounds to the secondary service.
pub const ISO_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Convert a Julian date to a UTC timestamp.
pub fn jd_to_datetime(jd: f64) -> Result<DateTime<Utc>> {
    if !jd.is_finite() {
        return Err(Error::InvalidTime(format!("non-finite julian date {jd}")));
    }
    let millis = ((jd - UNIX_EPOCH_JD) * MILLIS_PER_DAY).round();
    DateTime::from_timestamp_millis(millis as i64)
        .ok_or_else(|| Error::InvalidTime(format!("julian date {jd} out of range")))
}

/// Convert a Julian date to `YYYY-MM-DD HH:MM:SS.sss`.
pub fn jd_to_iso(jd: f64) -> Result<String> {
    Ok(jd_to_datetime(jd)?.format(ISO_FORMAT).to_string())
}

/// Convert a UTC timestamp to a Julian date.
pub fn datetime_to_jd(dt: DateTime<Utc>) -> f64 {
    UNIX_EPOCH_JD + dt.timestamp_millis() as f64 / MILLIS_PER_DAY
}

/// Parse either a numeric Julian date or an ISO-8601 date/datetime.
///
/// Accepted forms: `2460000.5`, `2023-02-24`, `2023-02-24T12:00:00`,
/// `2023-02-24 12:00:00.250`, and RFC 3339 with an offset.
pub fn parse_jd(input: &str) -> Result<f64> {
    let s = input.trim();
    if let Ok(jd) = s.parse::<f64>() {
        if jd.is_finite() {
            return Ok(jd);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(datetime_to_jd(dt.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(datetime_to_jd(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(datetime_to_jd(naive.and_utc()));
        }
    }
    Err(Error::InvalidTime(format!("cannot parse '{input}' as a julian date or ISO time")))
}
