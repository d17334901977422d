//! Top-level error type of the tap library.

use thiserror::Error;

use crate::configs::ConfigError;
use crate::retrieve::RetrieveError;
use crate::singer::TransformError;
use crate::utils::datetime::DateTimeError;

#[derive(Debug, Error)]
pub enum TapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error("Stream {stream}: {source}")]
    Transform {
        stream: String,
        #[source]
        source: TransformError,
    },

    #[error("Invalid bookmark for stream {stream}: {source}")]
    Bookmark {
        stream: String,
        #[source]
        source: DateTimeError,
    },

    #[error("Invalid embedded schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("Failed to write message: {0}")]
    Output(#[from] std::io::Error),
}
