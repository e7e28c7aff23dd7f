//! JSON log lines on stderr.
//!
//! Engine events carry `component` and `event` fields plus the scenario,
//! driver and timestep they concern. Library code only emits events; binaries
//! call [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::config::{EngineConfig, DEFAULT_LOG_FILTER};

/// Installs the global JSON subscriber. Returns `false` if one was already set.
pub fn init_tracing(config: &EngineConfig) -> bool {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
