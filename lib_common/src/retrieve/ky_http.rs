//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It joins relative endpoints onto a base URL, injects the `User-Agent` and
//! `Authorization` headers, and hands the status code and JSON body of every
//! response back to the caller without judging the status.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while building or executing a request.
///
/// Non-2xx statuses are not errors here; they come back as an `ApiResponse`.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The base URL or the joined endpoint is not a valid absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The underlying client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),

    /// Connection, TLS, timeout or body read failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// A standardized container for API responses.
///
/// This struct wraps the decoded body along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// The body decoded as JSON, if it was non-empty valid JSON.
    pub data: Option<Value>,
    /// The raw body text when it could not be decoded as JSON.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest`, it handles base URLs, the API key header and the
/// user agent. One instance is reused across all pages of a sync run so the
/// connection pool is shared.
pub struct ApiClient {
    /// The underlying client, carrying the user agent.
    inner: reqwest::Client,
    /// The base URL to which all relative paths are joined. Always ends with `/`.
    base_url: Url,
    /// The raw API key sent as the `Authorization` header.
    api_key: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://public-api.ringover.com/v2").
    ///   A trailing slash is added when missing so that endpoint joining keeps the last segment.
    /// * `api_key` - An optional key sent verbatim in the `Authorization` header.
    /// * `user_agent` - The value of the `User-Agent` header.
    /// * `timeout` - An optional per-request timeout. `None` keeps the transport default.
    ///
    /// # Errors
    /// Returns `RetrieveError::InvalidUrl` if `base_url` is not absolute, or
    /// `RetrieveError::ClientBuild` if the TLS backend cannot be initialized.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, RetrieveError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let url = Url::parse(&normalized)?;

        let mut builder = reqwest::Client::builder().user_agent(user_agent.to_string());
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(RetrieveError::ClientBuild)?;

        Ok(Self {
            inner: client,
            base_url: url,
            api_key,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, RetrieveError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Performs a GET request and captures the response.
    ///
    /// # Arguments
    /// * `path` - The relative path to append to the base URL.
    /// * `query` - Query parameters, sent in the given order.
    ///
    /// # Errors
    /// Returns a `RetrieveError` if URL joining, network execution or reading
    /// the body fails. Any HTTP status, including 4xx and 5xx, is `Ok`.
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<ApiResponse, RetrieveError> {
        // 1. Construct the full absolute URL
        let full_url = self.endpoint_url(path)?;
        let mut req = self.inner.get(full_url).query(query);

        // 2. Inject the API key if present
        if let Some(key) = &self.api_key {
            req = req.header(AUTHORIZATION, key.as_str());
        }

        // 3. Execute the request and capture response metadata
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        // 4. Decode the body. An empty or non-JSON body is kept as text.
        let text = response.text().await?;
        let (data, error_body) = if text.trim().is_empty() {
            (None, None)
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => (Some(value), None),
                Err(_) => (None, Some(text)),
            }
        };

        Ok(ApiResponse {
            data,
            error_body,
            status: status.as_u16(),
            success: status.is_success(),
            headers: resp_headers,
        })
    }
}
