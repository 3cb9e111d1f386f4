// ABOUTME: Typed substrate settings resolved once from the environment
// ABOUTME: Driver URL, session limits, directory layout, database and packager endpoints

use crate::constants::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_DRIVER_URL: &str = "http://127.0.0.1:39400";
pub const DEFAULT_PACKAGER_URL: &str = "http://127.0.0.1:39500";
pub const DEFAULT_REGISTRY_PORT: u16 = 39600;
pub const DEFAULT_MAX_SESSIONS: usize = 10;
pub const MAX_SESSIONS_LIMIT: usize = 100;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid port number for {name}: {value}")]
    InvalidPort { name: String, value: String },
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Missing required setting: {0}")]
    Missing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub driver_url: String,
    pub max_sessions: usize,
    pub browserless_url: Option<String>,
    pub vrooli_root: PathBuf,
    pub scenarios_dir: PathBuf,
    pub data_dir: PathBuf,
    pub sandbox_dir: PathBuf,
    pub database_url: String,
    pub packager_url: String,
    pub registry_port: u16,
    pub lifecycle_managed: bool,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let driver_url = normalize_base_url(
            &non_empty(PLAYWRIGHT_DRIVER_URL).unwrap_or_else(|| DEFAULT_DRIVER_URL.to_string()),
        );

        let max_sessions = parse_max_sessions(non_empty(MAX_SESSIONS).as_deref());

        let vrooli_root = non_empty(VROOLI_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home(&lookup).join("Vrooli"));

        let scenarios_dir = non_empty(VROOLI_SCENARIOS_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| vrooli_root.join("scenarios"));

        let data_dir = non_empty(VROOLI_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| vrooli_root.join("data").join("executions"));

        let sandbox_dir = non_empty(VROOLI_SANDBOX_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| vrooli_root.join("data").join("sandboxes"));

        let database_url = non_empty(VROOLI_DATABASE_URL).unwrap_or_else(|| {
            format!(
                "sqlite://{}?mode=rwc",
                vrooli_root.join("data").join("substrate.db").display()
            )
        });

        let packager_url = normalize_base_url(
            &non_empty(DEPLOYMENT_PACKAGER_URL)
                .unwrap_or_else(|| DEFAULT_PACKAGER_URL.to_string()),
        );

        let registry_port = match non_empty(TOOL_REGISTRY_PORT) {
            Some(raw) => {
                let port = raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort {
                    name: TOOL_REGISTRY_PORT.to_string(),
                    value: raw.clone(),
                })?;
                if port == 0 {
                    return Err(ConfigError::PortOutOfRange(port));
                }
                port
            }
            None => DEFAULT_REGISTRY_PORT,
        };

        Ok(Self {
            driver_url,
            max_sessions,
            browserless_url: non_empty(BROWSERLESS_URL).map(|u| normalize_base_url(&u)),
            vrooli_root,
            scenarios_dir,
            data_dir,
            sandbox_dir,
            database_url,
            packager_url,
            registry_port,
            // Presence alone enables the gate, even when empty
            lifecycle_managed: lookup(VROOLI_LIFECYCLE_MANAGED).is_some(),
        })
    }
}

/// Trim whitespace and trailing slashes from a base URL.
pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Parse `MAX_SESSIONS`, clamping to 1..=100 and defaulting to 10.
pub fn parse_max_sessions(raw: Option<&str>) -> usize {
    match raw.map(str::trim) {
        None => DEFAULT_MAX_SESSIONS,
        Some(value) => match value.parse::<i64>() {
            Ok(n) if n < 1 => 1,
            Ok(n) if n as u64 > MAX_SESSIONS_LIMIT as u64 => MAX_SESSIONS_LIMIT,
            Ok(n) => n as usize,
            Err(_) => {
                warn!("Ignoring unparseable {} value: {}", MAX_SESSIONS, value);
                DEFAULT_MAX_SESSIONS
            }
        },
    }
}

fn default_home<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    // HOME first so tests can redirect it, then the platform home directory
    lookup(HOME)
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
