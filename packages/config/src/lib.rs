// ABOUTME: Configuration for the Vrooli execution substrate
// ABOUTME: Environment variable names plus a typed settings loader read once at startup

pub mod constants;
pub mod settings;

pub use settings::{normalize_base_url, parse_max_sessions, ConfigError, Settings};
