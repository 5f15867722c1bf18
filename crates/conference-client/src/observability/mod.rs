//! Observability for the conference client.
//!
//! # Privacy by Default
//!
//! Async entry points use `#[instrument(skip_all)]` with explicit safe
//! fields. Session tokens are `SecretString` and never reach a log line.
//! Nicknames are user data and are only logged at debug level.
//!
//! # Log targets
//!
//! | Target | Component |
//! |--------|-----------|
//! | `cc.directory` | Participant directory |
//! | `cc.coordinator` | Dual-session coordinator |
//! | `cc.events` | Session event loop |
//! | `cc.stt` | Speech-to-text subscription manager |
//! | `cc.orchestrator` | Action orchestrator |
//! | `cc.client` | Client wiring and shutdown |
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `cc_toggle_total` | Counter | `action`, `outcome` | User toggle actions |
//! | `cc_session_connect_total` | Counter | `session`, `outcome` | Session connects |
//! | `cc_capture_fallback_total` | Counter | `outcome` | Device fallback retries |
//! | `cc_stt_pass_total` | Counter | `outcome` | Transcription subscription passes |
//! | `cc_remote_participants` | Gauge | none | Remote participants in the directory |
//! | `cc_transport_events_total` | Counter | `event` | Transport events drained |

pub mod metrics;

use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use self::metrics::{
    record_capture_fallback, record_session_connect, record_stt_pass, record_toggle,
    record_transport_event, set_remote_participants,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.log_level` is used.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| format!("Invalid log filter '{}': {e}", config.log_level))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {e}"))
}
