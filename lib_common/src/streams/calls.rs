//! # Ringover Calls Stream
//!
//! Pages through `GET /calls`. Each request carries the fixed `start_date` of
//! the run and, after the first page, the `cdr_id` of the last call returned so
//! far as `last_id_returned`. Pagination continues while the server reports at
//! least a full page worth of calls in `call_list_count`.
//!
//! Every call is tagged with the flattened `ivr_id`, `contact_id` and `user_id`
//! of its nested objects.

use serde_json::Value;

use super::bookmark::{SeenIds, Watermark};
use super::{Page, Record, Stream};
use crate::utils::datetime::format_bookmark;

const CALLS_SCHEMA: &str = include_str!("../../schemas/calls.json");

/// Nested object name and the identifier copied from it.
const DERIVED_IDS: [(&str, &str); 3] = [("ivr", "ivr_id"), ("contact", "contact_id"), ("user", "user_id")];

/// The `calls` stream.
#[derive(Debug, Clone)]
pub struct CallsStream {
    schema: Value,
    limit: u64,
}

impl CallsStream {
    /// Loads the embedded schema.
    pub fn new() -> Result<Self, serde_json::Error> {
        Ok(Self {
            schema: serde_json::from_str(CALLS_SCHEMA)?,
            limit: 1000,
        })
    }

    /// Overrides the page size.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    fn call_list(page: &Page) -> Option<&Vec<Value>> {
        page.field("call_list").and_then(Value::as_array)
    }

    /// `cdr_id` of the last call in `page`, rendered for a query string.
    fn last_record_id(page: &Page) -> Option<String> {
        match Self::call_list(page)?.last()?.get("cdr_id")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl Stream for CallsStream {
    fn tap_stream_id(&self) -> &str {
        "calls"
    }

    fn endpoint(&self) -> &str {
        "calls"
    }

    fn key_properties(&self) -> Vec<String> {
        vec!["call_id".to_string()]
    }

    fn bookmark_field(&self) -> Option<&str> {
        Some("start_time")
    }

    fn limit(&self) -> u64 {
        self.limit
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    fn build_request_params(&self, last_page: Option<&Page>, watermark: &Watermark) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(initial) = watermark.initial() {
            params.push(("start_date".to_string(), format_bookmark(&initial)));
        }
        if let Some(last_id) = last_page.and_then(Self::last_record_id) {
            params.push(("last_id_returned".to_string(), last_id));
        }
        params
    }

    fn extract_records(&self, page: &Page) -> Vec<Record> {
        Self::call_list(page)
            .map(|calls| calls.iter().filter_map(|c| c.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    fn enrich(&self, mut record: Record, seen: &mut SeenIds) -> Record {
        let id = record.get("cdr_id").cloned().unwrap_or(Value::Null);
        if seen.check_and_insert(&id) {
            log::info!("ID: {} is already fetched", id);
        }

        for (nested, key) in DERIVED_IDS {
            let derived = record
                .get(nested)
                .and_then(Value::as_object)
                .and_then(|obj| obj.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            record.insert(key.to_string(), derived);
        }

        record
    }

    fn has_more_data(&self, page: &Page) -> bool {
        page.field("call_list_count")
            .and_then(Value::as_u64)
            .map_or(false, |count| count >= self.limit)
    }
}
