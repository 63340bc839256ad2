//! Time window codec
//!
//! Guru filters cards with a textual query such as
//! `lastModified >= 2024-01-15T10:00:00.000+0000 AND lastModified < ...`.
//! This module converts Unix epoch seconds into that timestamp format and
//! parses the timestamps Guru returns on cards.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{IngestionError, Result};

/// Seconds since the Unix epoch, possibly fractional
pub type SecondsSinceUnixEpoch = f64;

const GURU_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Formats an epoch timestamp the way the Guru query language expects.
///
/// Sub-millisecond precision is truncated, never rounded.
pub fn to_guru_time(epoch_seconds: SecondsSinceUnixEpoch) -> Result<String> {
    let datetime = epoch_to_utc(epoch_seconds)?;
    Ok(datetime.format(GURU_TIME_FORMAT).to_string())
}

/// Converts epoch seconds to a UTC instant truncated to milliseconds
pub fn epoch_to_utc(epoch_seconds: SecondsSinceUnixEpoch) -> Result<DateTime<Utc>> {
    if !epoch_seconds.is_finite() {
        return Err(IngestionError::InvalidTimestamp(epoch_seconds.to_string()));
    }

    // Settle float noise at microsecond precision before truncating
    let micros = (epoch_seconds * 1_000_000.0).round();
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return Err(IngestionError::InvalidTimestamp(epoch_seconds.to_string()));
    }
    let millis = (micros as i64).div_euclid(1000);

    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| IngestionError::InvalidTimestamp(epoch_seconds.to_string()))
}

/// Parses a timestamp as returned by Guru into UTC.
///
/// Accepts Guru's own `+0000` offset form, RFC 3339, and offset-less values
/// which are taken as UTC.
pub fn parse_guru_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }

    Err(IngestionError::InvalidTimestamp(value.to_string()))
}

/// Half-open poll window `[start, end)` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: SecondsSinceUnixEpoch,
    pub end: SecondsSinceUnixEpoch,
}

impl TimeWindow {
    pub fn new(start: SecondsSinceUnixEpoch, end: SecondsSinceUnixEpoch) -> Self {
        Self { start, end }
    }

    /// Inverted windows are passed through; the API treats them as empty
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Builds the `q` parameter for the search endpoint
    pub fn filter_expression(&self) -> Result<String> {
        let start = to_guru_time(self.start)?;
        let end = to_guru_time(self.end)?;
        Ok(format!(
            "lastModified >= {} AND lastModified < {}",
            start, end
        ))
    }
}
