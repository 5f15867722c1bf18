//! Pre-configured test data for conference client tests.
//!
//! Provides:
//! - Execution contexts and configs
//! - Local identities and join requests
//! - Transport events as a remote client would produce them

use common::secret::SecretString;
use common::types::{ConnectionId, ParticipantId, SessionKind};
use conference_client::coordinator::{ExecutionContext, SessionIdentity};
use conference_client::metadata::{ConnectionMetadata, NicknamePayload};
use conference_client::participant::ParticipantRole;
use conference_client::transport::{ReceivedSignal, SignalType, StreamId, TransportEvent};
use conference_client::{Config, JoinRequest};

/// Context with screen capture and without device fallback.
#[must_use]
pub fn test_context() -> ExecutionContext {
    ExecutionContext {
        screen_capture_supported: true,
        device_fallback_on_access_denied: false,
    }
}

/// Default config with a short transcription retry interval.
#[must_use]
pub fn test_config() -> Config {
    Config {
        stt_retry_interval: std::time::Duration::from_millis(100),
        ..Config::default()
    }
}

#[must_use]
pub fn test_identity(id: &str, nickname: &str) -> SessionIdentity {
    SessionIdentity {
        participant_id: ParticipantId::new(id),
        nickname: nickname.to_string(),
    }
}

/// Test join request fixture. Camera and microphone on, both tokens set.
#[derive(Debug, Clone)]
pub struct TestJoin {
    pub participant_id: String,
    pub nickname: String,
    pub video: bool,
    pub audio: bool,
    pub with_screen_token: bool,
}

impl TestJoin {
    #[must_use]
    pub fn new(participant_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            nickname: nickname.into(),
            video: true,
            audio: true,
            with_screen_token: true,
        }
    }

    #[must_use]
    pub fn with_video(mut self, video: bool) -> Self {
        self.video = video;
        self
    }

    #[must_use]
    pub fn with_audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub fn without_screen_token(mut self) -> Self {
        self.with_screen_token = false;
        self
    }

    #[must_use]
    pub fn build(self) -> JoinRequest {
        JoinRequest {
            participant_id: ParticipantId::new(self.participant_id),
            nickname: self.nickname,
            role: ParticipantRole::Publisher,
            webcam_token: SecretString::from("webcam-token"),
            screen_token: self
                .with_screen_token
                .then(|| SecretString::from("screen-token")),
            video: self.video,
            audio: self.audio,
        }
    }
}

/// Stream id the fixtures use for a connection. The mock transport
/// subscribes it as `sub-stream-{connection_id}`.
#[must_use]
pub fn stream_id_for(connection_id: &str) -> StreamId {
    StreamId::new(format!("stream-{connection_id}"))
}

/// Subscriber handle the mock transport returns for [`stream_created`].
#[must_use]
pub fn subscriber_for(connection_id: &str) -> conference_client::transport::SubscriberHandle {
    conference_client::transport::SubscriberHandle::new(format!("sub-stream-{connection_id}"))
}

/// A remote stream with metadata as a remote client advertises it
/// (screen nicknames carry the `_SCREEN` suffix).
#[must_use]
pub fn stream_created(
    session: SessionKind,
    connection_id: &str,
    participant_id: &str,
    nickname: &str,
) -> TransportEvent {
    let data = ConnectionMetadata::for_session(session, &ParticipantId::new(participant_id), nickname)
        .to_json()
        .unwrap();
    stream_created_raw(session, connection_id, &data)
}

/// A remote stream with arbitrary connection data.
#[must_use]
pub fn stream_created_raw(session: SessionKind, connection_id: &str, data: &str) -> TransportEvent {
    TransportEvent::StreamCreated {
        session,
        connection_id: ConnectionId::new(connection_id),
        stream_id: stream_id_for(connection_id),
        data: data.to_string(),
    }
}

#[must_use]
pub fn connection_destroyed(session: SessionKind, connection_id: &str) -> TransportEvent {
    TransportEvent::ConnectionDestroyed {
        session,
        connection_id: ConnectionId::new(connection_id),
    }
}

#[must_use]
pub fn nickname_signal(from: &str, nickname: &str) -> TransportEvent {
    let data = serde_json::to_string(&NicknamePayload {
        client_data: nickname.to_string(),
    })
    .unwrap();
    TransportEvent::SignalReceived(ReceivedSignal {
        kind: SignalType::NicknameChanged,
        from: Some(ConnectionId::new(from)),
        data,
    })
}

#[must_use]
pub fn force_mute_signal(from: &str, participant_id: &str, muted: bool) -> TransportEvent {
    TransportEvent::SignalReceived(ReceivedSignal {
        kind: SignalType::ForceMute,
        from: Some(ConnectionId::new(from)),
        data: serde_json::json!({ "participantId": participant_id, "muted": muted }).to_string(),
    })
}
