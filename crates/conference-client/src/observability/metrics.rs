//! Metrics definitions for the conference client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cc_` prefix for the conference client
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `action`: video, audio, screen, track, nickname
//! - `outcome`: ok plus the labels of `ClientError::metric_label`
//! - `session`: webcam, screen
//! - `event`: bounded by `TransportEvent::label`
//!
//! The exporter is chosen by the embedding application; without an installed
//! recorder every call here is a no-op.

use metrics::{counter, gauge};

/// Record a user toggle action and its outcome.
///
/// Metric: `cc_toggle_total`
/// Labels: `action`, `outcome`
pub fn record_toggle(action: &'static str, outcome: &'static str) {
    counter!("cc_toggle_total", "action" => action, "outcome" => outcome).increment(1);
}

/// Record a session connect attempt.
///
/// Metric: `cc_session_connect_total`
/// Labels: `session` (webcam, screen), `outcome` (connected, already_connected, error)
pub fn record_session_connect(session: &'static str, outcome: &'static str) {
    counter!("cc_session_connect_total", "session" => session, "outcome" => outcome)
        .increment(1);
}

/// Record a capture retry with the last-known-good device.
///
/// Metric: `cc_capture_fallback_total`
/// Labels: `outcome` (recovered, failed)
pub fn record_capture_fallback(outcome: &'static str) {
    counter!("cc_capture_fallback_total", "outcome" => outcome).increment(1);
}

/// Record a speech-to-text subscription pass.
///
/// Metric: `cc_stt_pass_total`
/// Labels: `outcome` (ready, partial)
pub fn record_stt_pass(outcome: &'static str) {
    counter!("cc_stt_pass_total", "outcome" => outcome).increment(1);
}

/// Set the number of remote participants in the directory.
///
/// Metric: `cc_remote_participants`
pub fn set_remote_participants(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("cc_remote_participants").set(count as f64);
}

/// Record a transport event drained by the session event loop.
///
/// Metric: `cc_transport_events_total`
/// Labels: `event`
pub fn record_transport_event(event: &'static str) {
    counter!("cc_transport_events_total", "event" => event).increment(1);
}
