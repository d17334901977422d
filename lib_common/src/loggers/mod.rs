/// Logger bootstrap: stderr plus an optional rotated log file.
pub mod logger;

pub use logger::{parse_level, setup_logging, LoggerError};
