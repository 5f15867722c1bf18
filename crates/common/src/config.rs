//! Common configuration types for the dual-session client crates.

use serde::{Deserialize, Serialize};

/// Default `EnvFilter` directive when neither `RUST_LOG` nor a log level is set.
pub const DEFAULT_LOG_FILTER: &str = "conference_client=debug";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `info`, `conference_client=trace`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}
