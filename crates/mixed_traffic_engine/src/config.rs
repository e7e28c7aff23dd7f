use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

pub const DEFAULT_DATABASE_PATH: &str = "mixed_traffic.sqlite3";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    /// Reads `MIXED_TRAFFIC_DB_PATH`, `MIXED_TRAFFIC_BUSY_TIMEOUT_MS` and
    /// `RUST_LOG`, falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let database_path = lookup("MIXED_TRAFFIC_DB_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let busy_timeout_ms = match lookup("MIXED_TRAFFIC_BUSY_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                EngineError::validation(format!(
                    "MIXED_TRAFFIC_BUSY_TIMEOUT_MS must be a non-negative integer, got '{raw}'"
                ))
            })?,
            None => defaults.busy_timeout_ms,
        };

        let log_filter = lookup("RUST_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        Ok(Self {
            database_path,
            busy_timeout_ms,
            log_filter,
        })
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
