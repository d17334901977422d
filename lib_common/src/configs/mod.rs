//! # Configuration Modules
//!
//! Loading of the tap configuration file, plus the optional state and catalog
//! documents passed on the command line.

/// The tap configuration, its defaults and required-key validation.
pub mod tap_config;

pub use tap_config::{load_json_file, ConfigError, TapConfig, API_ENDPOINT, REQUIRED_CONFIG_KEYS};
