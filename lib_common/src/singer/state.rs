//! Bookmark state carried between runs.
//!
//! The document shape is `{"bookmarks": {"<stream>": {"<field>": "<value>"}}}`.
//! Any other top-level keys a previous run or the orchestrator stored are kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The Singer state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Value);

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// An empty state (`{}`).
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Wraps an existing document. Non-object values are replaced by `{}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => Self(value),
            _ => Self::new(),
        }
    }

    /// Borrow the raw document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The stored bookmark for `stream`/`field`, if it is a string.
    pub fn get_bookmark(&self, stream: &str, field: &str) -> Option<&str> {
        self.0
            .get("bookmarks")
            .and_then(|b| b.get(stream))
            .and_then(|s| s.get(field))
            .and_then(Value::as_str)
    }

    /// Sets `stream`/`field` to `value`, creating intermediate objects.
    pub fn write_bookmark(&mut self, stream: &str, field: &str, value: impl Into<String>) {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        let root = match self.0.as_object_mut() {
            Some(root) => root,
            None => return,
        };

        let bookmarks = root
            .entry("bookmarks")
            .or_insert_with(|| Value::Object(Map::new()));
        if !bookmarks.is_object() {
            *bookmarks = Value::Object(Map::new());
        }
        let Some(bookmarks) = bookmarks.as_object_mut() else {
            return;
        };

        let stream_entry = bookmarks
            .entry(stream.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !stream_entry.is_object() {
            *stream_entry = Value::Object(Map::new());
        }
        if let Some(stream_entry) = stream_entry.as_object_mut() {
            stream_entry.insert(field.to_string(), Value::String(value.into()));
        }
    }
}
