//! # Watermarks and Duplicate Tracking
//!
//! A `Watermark` holds the two bookmarks of a sync run:
//!
//! - `initial`: fixed for the run, decides which records are emitted;
//! - `max`: the highest bookmark observed so far, seeded with `initial`,
//!   never decreasing, persisted (plus one second) when the run ends.
//!
//! `SeenIds` is per-run state used only to log when the API returns the same
//! call twice.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::singer::State;
use crate::utils::datetime::{format_bookmark, parse_datetime, DateTimeError};

/// Bookmarks of one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    initial: Option<DateTime<Utc>>,
    max: Option<DateTime<Utc>>,
}

impl Watermark {
    /// Seeds both bookmarks with `initial`.
    pub fn new(initial: Option<DateTime<Utc>>) -> Self {
        Self { initial, max: initial }
    }

    /// Loads the initial bookmark from state, falling back to `start_date`.
    pub fn from_state(
        state: &State,
        stream: &str,
        bookmark_field: &str,
        start_date: &str,
    ) -> Result<Self, DateTimeError> {
        let raw = state.get_bookmark(stream, bookmark_field).unwrap_or(start_date);
        Ok(Self::new(Some(parse_datetime(raw)?)))
    }

    /// The bookmark in effect when the run started.
    pub fn initial(&self) -> Option<DateTime<Utc>> {
        self.initial
    }

    /// The highest bookmark observed so far.
    pub fn max(&self) -> Option<DateTime<Utc>> {
        self.max
    }

    /// Whether a record with bookmark `value` should be emitted.
    ///
    /// Absent values and runs without an initial bookmark always pass; otherwise
    /// the value must not be earlier than the initial bookmark.
    pub fn admits(&self, value: Option<DateTime<Utc>>) -> bool {
        match (self.initial, value) {
            (Some(initial), Some(v)) => v >= initial,
            _ => true,
        }
    }

    /// Raises `max` to `value` if it is not lower.
    pub fn observe(&mut self, value: DateTime<Utc>) {
        match self.max {
            Some(current) if value < current => {}
            _ => self.max = Some(value),
        }
    }

    /// The value persisted for the next run: `max` plus one second.
    pub fn next_bookmark(&self) -> Option<String> {
        self.max.map(|m| format_bookmark(&(m + Duration::seconds(1))))
    }
}

/// Reads the bookmark field of a record.
///
/// `Ok(None)` for missing or null values; an error when the value is present
/// but is not a timestamp string.
pub fn record_bookmark(
    record: &Map<String, Value>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, DateTimeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_datetime(s).map(Some),
        Some(other) => Err(DateTimeError::Unrecognized(other.to_string())),
    }
}

/// Identifiers already returned during the current run.
#[derive(Debug, Default)]
pub struct SeenIds(HashSet<String>);

impl SeenIds {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id`; returns `true` if it had been seen before.
    pub fn check_and_insert(&mut self, id: &Value) -> bool {
        let key = match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        !self.0.insert(key)
    }

    /// Number of distinct identifiers seen.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
