//! # Streams Module
//!
//! A stream is one kind of record pulled from one API resource. The polling
//! engine drives every stream the same way; a stream only supplies the pieces
//! that depend on its payload shape, through the `Stream` trait:
//!
//! - how to build the query for the next page from the previous one;
//! - where the records live in a page;
//! - which derived fields to attach to a record;
//! - whether another page should be requested.
//!
//! ## Contained Modules:
//!
//! - **`bookmark`**: `Watermark` and `SeenIds`, the mutable state of a run.
//! - **`engine`**: `PollingEngine`, the request/paginate/throttle/bookmark loop.
//! - **`calls`**: `CallsStream`, the Ringover calls resource.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use serde_json::{Map, Value};

use crate::retrieve::ApiResponse;

/// Watermark and duplicate tracking.
pub mod bookmark;
/// The Ringover calls stream.
pub mod calls;
/// The generic polling engine.
pub mod engine;

pub use bookmark::{SeenIds, Watermark};
pub use calls::CallsStream;
pub use engine::{PollingEngine, StopReason, SyncSummary};

/// One record as returned by the API.
pub type Record = Map<String, Value>;

/// A response treated as a data page.
#[derive(Debug, Clone)]
pub struct Page {
    /// HTTP status of the response.
    pub status: u16,
    /// Decoded JSON body, if any.
    pub payload: Option<Value>,
}

impl Page {
    /// Looks up a top-level field of the payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(name))
    }
}

impl From<ApiResponse> for Page {
    fn from(response: ApiResponse) -> Self {
        Self {
            status: response.status,
            payload: response.data,
        }
    }
}

/// What a stream supplies to the polling engine.
pub trait Stream {
    /// Identifier used in catalog, messages and state.
    fn tap_stream_id(&self) -> &str;

    /// Path of the resource relative to the API base URL.
    fn endpoint(&self) -> &str;

    /// Primary key fields.
    fn key_properties(&self) -> Vec<String>;

    /// Record field holding the bookmark timestamp, if the stream is incremental.
    fn bookmark_field(&self) -> Option<&str>;

    /// Page size sent as `limit_count`.
    fn limit(&self) -> u64 {
        1000
    }

    /// JSON Schema of the stream's records.
    fn schema(&self) -> &Value;

    /// Query parameters for the next request. `last_page` is `None` on the first call.
    fn build_request_params(&self, last_page: Option<&Page>, watermark: &Watermark) -> Vec<(String, String)>;

    /// Records contained in a page; empty when the page carries none.
    fn extract_records(&self, page: &Page) -> Vec<Record>;

    /// Attaches derived fields to a raw record.
    fn enrich(&self, record: Record, seen: &mut SeenIds) -> Record;

    /// Whether another page should be requested after `page`.
    fn has_more_data(&self, page: &Page) -> bool;
}
