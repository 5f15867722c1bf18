//! Common data types for the dual-session client crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable logical identifier of a participant (local or remote).
///
/// Application-defined; unique across local and remote participants. Not the
/// same thing as a [`ConnectionId`]: one participant can own a camera
/// connection and a screen connection at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random participant ID
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Transport-assigned identifier of one physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an existing identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConnectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The rendezvous key used before a camera connection is established is the
/// participant id itself.
impl From<&ParticipantId> for ConnectionId {
    fn from(value: &ParticipantId) -> Self {
        Self(value.0.clone())
    }
}

/// Kind of a media stream.
///
/// Serialized as `CAMERA` / `SCREEN` on the wire (connection metadata).
/// Lowercase spellings are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamKind {
    /// Webcam (plus microphone) stream.
    #[serde(alias = "camera")]
    Camera,
    /// Screen-share stream.
    #[serde(alias = "screen")]
    Screen,
}

impl StreamKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Camera => "camera",
            StreamKind::Screen => "screen",
        }
    }

    /// The session this kind of stream is published into.
    #[must_use]
    pub fn session(self) -> SessionKind {
        match self {
            StreamKind::Camera => SessionKind::Webcam,
            StreamKind::Screen => SessionKind::Screen,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two media sessions a local user maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Primary session carrying the camera publisher.
    Webcam,
    /// Independent session carrying the screen publisher.
    Screen,
}

impl SessionKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Webcam => "webcam",
            SessionKind::Screen => "screen",
        }
    }

    /// The stream kind published into this session.
    #[must_use]
    pub fn stream_kind(self) -> StreamKind {
        match self {
            SessionKind::Webcam => StreamKind::Camera,
            SessionKind::Screen => StreamKind::Screen,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kind_wire_format() {
        assert_eq!(
            serde_json::to_string(&StreamKind::Screen).unwrap(),
            "\"SCREEN\""
        );
        let kind: StreamKind = serde_json::from_str("\"CAMERA\"").unwrap();
        assert_eq!(kind, StreamKind::Camera);
    }

    #[test]
    fn test_stream_kind_accepts_lowercase() {
        let kind: StreamKind = serde_json::from_str("\"screen\"").unwrap();
        assert_eq!(kind, StreamKind::Screen);
        let kind: StreamKind = serde_json::from_str("\"camera\"").unwrap();
        assert_eq!(kind, StreamKind::Camera);
    }

    #[test]
    fn test_stream_kind_session_routing() {
        assert_eq!(StreamKind::Camera.session(), SessionKind::Webcam);
        assert_eq!(StreamKind::Screen.session(), SessionKind::Screen);
        assert_eq!(SessionKind::Screen.stream_kind(), StreamKind::Screen);
    }

    #[test]
    fn test_random_participant_ids_differ() {
        assert_ne!(ParticipantId::random(), ParticipantId::random());
    }

    #[test]
    fn test_rendezvous_connection_id_matches_participant() {
        let id = ParticipantId::new("alice");
        let conn = ConnectionId::from(&id);
        assert_eq!(conn.as_str(), id.as_str());
    }
}
