//! # Utilities Module
//!
//! General-purpose helpers shared by the rest of `lib_common` that do not belong
//! to a specific concern such as retrieval or the Singer protocol.
//!
//! ## Contained Modules:
//!
//! - **`datetime`**: lenient ISO-8601 parsing for bookmarks and configuration
//!   values, plus the timestamp formats the Singer protocol expects.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Timestamp parsing and formatting helpers.
pub mod datetime;
