//! Library behind the `tap-ringover` Singer tap.
//!
//! The generic `PollingEngine` pages through any `Stream`; `CallsStream` adapts
//! it to the Ringover calls endpoint. The `driver` module runs discovery and
//! sync on top of them.

pub mod configs;
pub mod driver;
pub mod errors;
pub mod loggers;
pub mod retrieve;
pub mod singer;
pub mod streams;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export the types the binary needs
pub use configs::TapConfig;
pub use driver::{discover, run_sync};
pub use errors::TapError;
pub use singer::{Catalog, MessageWriter, State};
