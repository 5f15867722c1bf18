//! Conference client error types.
//!
//! Errors carry enough detail for logs. What the end user sees comes from
//! [`ClientError::user_message`], which never includes transport internals.

use crate::config::ConfigError;
use crate::transport::{CaptureError, TransportError};
use common::types::{SessionKind, StreamKind};
use thiserror::Error;

/// Conference client error type.
///
/// Classification (see [`ClientError::is_recoverable`]):
/// - capability problems (`NotPublishable`, `PublisherMissing`,
///   `ScreenShareUnavailable`) leave state untouched; the user can carry on
/// - `Capture` is surfaced after the bounded device fallback
/// - `Transport` is surfaced immediately, never retried
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport call failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Capture device could not be acquired.
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// The session slot has no handle (not initialized, disconnected, or
    /// unsupported in this execution context).
    #[error("Session not available: {0}")]
    SessionUnavailable(SessionKind),

    /// No token was provided for the session.
    #[error("Missing token for session: {0}")]
    MissingToken(SessionKind),

    /// The connected session has no publish capability.
    #[error("Session cannot publish: {0}")]
    NotPublishable(SessionKind),

    /// The local participant has no publisher of this kind.
    #[error("No {0} publisher")]
    PublisherMissing(StreamKind),

    /// Screen capture is not supported in this execution context.
    #[error("Screen sharing unavailable")]
    ScreenShareUnavailable,

    /// The local participant has not been created yet.
    #[error("Local participant not initialized")]
    NotInitialized,

    /// Conflicting state (duplicate connection id, token already set).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Metadata could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl ClientError {
    /// Whether the user can keep going after this error without rejoining.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::NotPublishable(_)
            | ClientError::PublisherMissing(_)
            | ClientError::ScreenShareUnavailable
            | ClientError::Capture(_)
            | ClientError::Conflict(_) => true,
            ClientError::Transport(_)
            | ClientError::SessionUnavailable(_)
            | ClientError::MissingToken(_)
            | ClientError::NotInitialized
            | ClientError::Serialization(_)
            | ClientError::Config(_)
            | ClientError::Internal(_) => false,
        }
    }

    /// Returns a client-safe message (no internal details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Capture(CaptureError::DeviceAccessDenied(_)) => {
                "Access to the camera or microphone was denied".to_string()
            }
            ClientError::Capture(CaptureError::Other(_)) => {
                "The media device could not be started".to_string()
            }
            ClientError::NotPublishable(_) => {
                "You do not have permission to publish in this session".to_string()
            }
            ClientError::PublisherMissing(kind) => format!("No {kind} is available"),
            ClientError::ScreenShareUnavailable => {
                "Screen sharing is not available on this device".to_string()
            }
            ClientError::Transport(_)
            | ClientError::SessionUnavailable(_)
            | ClientError::MissingToken(_) => "Connection to the session failed".to_string(),
            ClientError::NotInitialized
            | ClientError::Conflict(_)
            | ClientError::Serialization(_)
            | ClientError::Config(_)
            | ClientError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Bounded label for the `outcome` metric dimension.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            ClientError::Transport(_) => "transport_error",
            ClientError::Capture(_) => "capture_error",
            ClientError::NotPublishable(_)
            | ClientError::PublisherMissing(_)
            | ClientError::ScreenShareUnavailable => "unavailable",
            ClientError::SessionUnavailable(_)
            | ClientError::MissingToken(_)
            | ClientError::NotInitialized => "not_ready",
            ClientError::Conflict(_)
            | ClientError::Serialization(_)
            | ClientError::Config(_)
            | ClientError::Internal(_) => "internal_error",
        }
    }
}
