//! Connection metadata.
//!
//! Each session connect carries a small JSON document identifying the
//! logical participant and the kind of stream the connection publishes:
//!
//! ```json
//! {"version":1,"type":"SCREEN","participantId":"p-1","clientData":"Ada_SCREEN"}
//! ```
//!
//! The server may append its own data after a `%/%` separator; that suffix
//! is stripped before parsing. Parsing is lenient field by field: unknown
//! fields are ignored and a bad field falls back to its default without
//! discarding the others.

use common::types::{ParticipantId, SessionKind, StreamKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Current metadata schema version.
pub const METADATA_VERSION: u32 = 1;

/// Separator between client metadata and server-appended data.
pub const SERVER_DATA_SEPARATOR: &str = "%/%";

/// Nickname suffix used by the screen session's connection.
pub const SCREEN_NICKNAME_SUFFIX: &str = "_SCREEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: StreamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<ParticipantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_data: Option<String>,
}

impl Default for ConnectionMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            kind: StreamKind::Camera,
            participant_id: None,
            client_data: None,
        }
    }
}

/// Wire shape with every field optional and untyped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    version: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<Value>,
    participant_id: Option<Value>,
    client_data: Option<Value>,
}

fn non_empty_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ConnectionMetadata {
    /// Metadata for one of the local user's sessions.
    ///
    /// The screen session advertises `{nickname}_SCREEN`.
    #[must_use]
    pub fn for_session(kind: SessionKind, participant_id: &ParticipantId, nickname: &str) -> Self {
        let client_data = match kind {
            SessionKind::Webcam => nickname.to_string(),
            SessionKind::Screen => format!("{nickname}{SCREEN_NICKNAME_SUFFIX}"),
        };
        Self {
            version: METADATA_VERSION,
            kind: kind.stream_kind(),
            participant_id: Some(participant_id.clone()),
            client_data: Some(client_data),
        }
    }

    /// Serialize for the connect call.
    ///
    /// # Errors
    ///
    /// Returns the serializer error (cannot happen for this shape in practice).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse metadata as delivered by the server. Never fails: anything
    /// unreadable becomes the default (camera, no participant id, no nickname).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let client_part = raw
            .split(SERVER_DATA_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim();

        let wire: WireMetadata = match serde_json::from_str(client_part) {
            Ok(wire) => wire,
            Err(e) => {
                debug!(
                    target: "cc.directory",
                    error = %e,
                    "Malformed connection metadata, using defaults"
                );
                return Self::default();
            }
        };

        let version = wire
            .version
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(METADATA_VERSION);
        if version > METADATA_VERSION {
            debug!(
                target: "cc.directory",
                version,
                "Connection metadata from a newer client, reading known fields"
            );
        }

        let kind = wire
            .kind
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|v| match v.to_ascii_uppercase().as_str() {
                "CAMERA" => Some(StreamKind::Camera),
                "SCREEN" => Some(StreamKind::Screen),
                _ => None,
            })
            .unwrap_or(StreamKind::Camera);

        Self {
            version,
            kind,
            participant_id: non_empty_string(wire.participant_id).map(ParticipantId::from),
            client_data: non_empty_string(wire.client_data),
        }
    }

    /// The advertised nickname, or `default` when absent.
    #[must_use]
    pub fn nickname_or(&self, default: &str) -> String {
        self.client_data
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Payload of a nickname-changed signal: `{"clientData": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicknamePayload {
    pub client_data: String,
}

impl NicknamePayload {
    /// Read a nickname from signal data, accepting a bare string too.
    #[must_use]
    pub fn parse(data: &str) -> Option<String> {
        let nickname = match serde_json::from_str::<NicknamePayload>(data) {
            Ok(payload) => payload.client_data,
            Err(_) => data.to_string(),
        };
        let nickname = nickname.trim();
        (!nickname.is_empty()).then(|| nickname.to_string())
    }
}
