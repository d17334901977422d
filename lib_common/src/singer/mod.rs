//! # Singer Protocol Module
//!
//! Everything a tap needs to speak the Singer protocol: the messages written to
//! stdout, the state document carrying bookmarks between runs, the catalog
//! produced by discovery, the schema-driven record transformer and the metric
//! log lines.
//!
//! ## Contained Modules:
//!
//! - **`messages`**: `SCHEMA`, `RECORD` and `STATE` messages plus a JSON-lines writer.
//! - **`state`**: reading and writing per-stream bookmarks.
//! - **`catalog`**: catalog entries, breadcrumb metadata and stream selection.
//! - **`transform`**: coercion of records against a JSON Schema.
//! - **`metrics`**: `METRIC:` log lines for request timings and record counts.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Catalog entries, metadata and selection.
pub mod catalog;
/// Singer messages and the JSON-lines writer.
pub mod messages;
/// Timer and counter metrics emitted as log lines.
pub mod metrics;
/// Bookmark state persisted between runs.
pub mod state;
/// Schema-driven record transformation.
pub mod transform;

pub use catalog::{Catalog, CatalogEntry, MetadataEntry, StreamMetadata};
pub use messages::{Message, MessageWriter};
pub use state::State;
pub use transform::{transform_record, TransformError};
