//! # Data Retrieval Module
//!
//! This module provides a centralized location for the HTTP client used by the
//! streams to talk to the Ringover API.
//!
//! ## Purpose:
//! The goal of the `retrieve` module is to keep URL joining, header injection and
//! response capture in one place so that the polling engine can focus on status
//! branching, pagination and bookmarks. Unlike a general client it deliberately
//! does not retry: rate limiting is decided by the engine, and transport errors
//! must abort the sync run.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A thin `ApiClient` built on `reqwest` that returns the status
//!   code and the JSON body of every response, whatever the status.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client that captures status and body for every response.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, RetrieveError};
