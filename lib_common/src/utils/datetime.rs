//! # Date-Time Helpers
//!
//! Bookmarks arrive from three places: the configured `start_date`, persisted
//! state, and the `start_time` field of API records. None of them is guaranteed
//! to carry an offset, so parsing accepts RFC 3339 as well as naive date-times
//! and plain dates, which are read as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Naive layouts tried after RFC 3339 and the offset-carrying variants fail.
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Offset layouts that are not strict RFC 3339 (`+0000`, space separator).
const OFFSET_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%#z"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// # Date-Time Error
///
/// Raised when a string cannot be read as a timestamp in any supported layout.
pub enum DateTimeError {
    /// The input matched none of the accepted layouts.
    #[error("Unrecognized timestamp: {0:?}")]
    Unrecognized(String),
}

/// Parses an ISO-8601 timestamp into UTC.
///
/// Accepted inputs, in order: RFC 3339 (`2024-03-01T10:00:00+02:00`), offset
/// variants (`2024-03-01T10:00:00+0200`, `2024-03-01 10:00:00+02`), naive
/// date-times (`2024-03-01T10:00:00`, `2024-03-01 10:00:00.123`) and dates
/// (`2024-03-01`). Naive inputs are interpreted as UTC.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>, DateTimeError> {
    let value = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(DateTimeError::Unrecognized(input.to_string()))
}

/// Formats a bookmark the way it is sent to the API and persisted in state,
/// e.g. `2024-03-01T10:00:00+00:00`.
pub fn format_bookmark(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Formats a date-time value inside an emitted record,
/// e.g. `2024-03-01T10:00:00.000000Z`.
pub fn format_record_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Current UTC time formatted for a `time_extracted` field.
pub fn now_extracted() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
