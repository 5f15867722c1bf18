//! Media transport contract.
//!
//! The conferencing library that actually moves media is an external
//! collaborator. Everything the client core needs from it is expressed by
//! [`MediaTransport`] plus a stream of [`TransportEvent`]s delivered over an
//! `mpsc` channel. Handles returned by the transport are opaque identifiers;
//! the transport keeps the real objects.

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{ConnectionId, SessionKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure reported by the transport for session-level operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server refused the request (bad token, role, etc.).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The session is not connected.
    #[error("Session not connected")]
    NotConnected,

    /// Anything else (network failure, library error).
    #[error("Transport failure: {0}")]
    Failed(String),
}

/// Failure to acquire a capture device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user or platform denied access to the device.
    #[error("Device access denied: {0}")]
    DeviceAccessDenied(String),

    /// Any other capture failure (device busy, not found, screen picker closed).
    #[error("Capture failed: {0}")]
    Other(String),
}

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a transport-issued identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_handle!(
    /// Local publisher owned by a local stream connection.
    PublisherHandle
);
opaque_handle!(
    /// Subscription to a remote stream, owned by a remote stream connection.
    SubscriberHandle
);
opaque_handle!(
    /// Server-side identifier of a published stream.
    StreamId
);

/// Media handle attached to a stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum MediaHandle {
    Publisher(PublisherHandle),
    Subscriber(SubscriberHandle),
}

impl MediaHandle {
    #[must_use]
    pub fn as_publisher(&self) -> Option<&PublisherHandle> {
        match self {
            MediaHandle::Publisher(p) => Some(p),
            MediaHandle::Subscriber(_) => None,
        }
    }

    #[must_use]
    pub fn as_subscriber(&self) -> Option<&SubscriberHandle> {
        match self {
            MediaHandle::Subscriber(s) => Some(s),
            MediaHandle::Publisher(_) => None,
        }
    }
}

/// Session object created by the transport and owned by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: String,
    kind: SessionKind,
}

impl SessionHandle {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }
}

/// What the server allows this connection to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionCapabilities {
    pub publish: bool,
    pub subscribe: bool,
}

/// Where a capture track comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureSource {
    /// No track of this kind.
    #[default]
    None,
    /// Whatever the platform picks.
    Default,
    /// A specific camera or microphone.
    Device(String),
    /// The native screen picker.
    Screen,
}

impl CaptureSource {
    #[must_use]
    pub fn is_requested(&self) -> bool {
        !matches!(self, CaptureSource::None)
    }
}

/// Which tracks to capture and from where.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureConstraints {
    pub video: CaptureSource,
    pub audio: CaptureSource,
}

impl CaptureConstraints {
    #[must_use]
    pub fn video_only(source: CaptureSource) -> Self {
        Self {
            video: source,
            audio: CaptureSource::None,
        }
    }

    #[must_use]
    pub fn audio_only(source: CaptureSource) -> Self {
        Self {
            video: CaptureSource::None,
            audio: source,
        }
    }
}

/// Properties of a publisher at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublisherProperties {
    pub constraints: CaptureConstraints,
    pub publish_video: bool,
    pub publish_audio: bool,
    pub mirror: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One captured media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    /// Device the track was captured from, when the platform reports it.
    pub device_id: Option<String>,
}

/// Result of a capture request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaStream {
    pub video: Option<MediaTrack>,
    pub audio: Option<MediaTrack>,
}

/// Application-level signal types carried over the webcam session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SignalType {
    NicknameChanged,
    Chat,
    ForceMute,
    Custom(String),
}

impl SignalType {
    /// Wire name of the signal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SignalType::NicknameChanged => "nicknameChanged",
            SignalType::Chat => "chat",
            SignalType::ForceMute => "forceMute",
            SignalType::Custom(name) => name,
        }
    }

    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name.strip_prefix("signal:").unwrap_or(name) {
            "nicknameChanged" => SignalType::NicknameChanged,
            "chat" => SignalType::Chat,
            "forceMute" => SignalType::ForceMute,
            other => SignalType::Custom(other.to_string()),
        }
    }
}

/// Signal to send. An empty `to` list broadcasts to the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSignal {
    pub kind: SignalType,
    pub to: Vec<ConnectionId>,
    pub data: String,
}

/// Signal received from the webcam session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedSignal {
    pub kind: SignalType,
    pub from: Option<ConnectionId>,
    pub data: String,
}

/// Remote stream property that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProperty {
    VideoActive,
    AudioActive,
}

/// Lifecycle and signalling events emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A stream was published into a session this client is connected to.
    StreamCreated {
        session: SessionKind,
        connection_id: ConnectionId,
        stream_id: StreamId,
        /// Raw connection metadata as delivered by the server.
        data: String,
    },
    /// A remote connection left.
    ConnectionDestroyed {
        session: SessionKind,
        connection_id: ConnectionId,
    },
    StreamPropertyChanged {
        connection_id: ConnectionId,
        property: StreamProperty,
        enabled: bool,
    },
    Reconnecting {
        session: SessionKind,
    },
    Reconnected {
        session: SessionKind,
    },
    SignalReceived(ReceivedSignal),
}

impl TransportEvent {
    /// Bounded label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TransportEvent::StreamCreated { .. } => "stream_created",
            TransportEvent::ConnectionDestroyed { .. } => "connection_destroyed",
            TransportEvent::StreamPropertyChanged { .. } => "stream_property_changed",
            TransportEvent::Reconnecting { .. } => "reconnecting",
            TransportEvent::Reconnected { .. } => "reconnected",
            TransportEvent::SignalReceived(_) => "signal_received",
        }
    }
}

/// Operations the client core needs from the media transport.
///
/// Implementations must be cheap to share (`Arc<dyn MediaTransport>`).
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Create a (not yet connected) session.
    async fn create_session(&self, kind: SessionKind) -> Result<SessionHandle, TransportError>;

    /// Connect a session with a token and client metadata.
    ///
    /// Returns the transport-assigned connection id.
    async fn connect(
        &self,
        session: &SessionHandle,
        token: &SecretString,
        metadata: &str,
    ) -> Result<ConnectionId, TransportError>;

    async fn disconnect(&self, session: &SessionHandle);

    /// Capabilities of a connected session.
    fn capabilities(&self, session: &SessionHandle) -> SessionCapabilities;

    async fn init_publisher(
        &self,
        properties: &PublisherProperties,
    ) -> Result<PublisherHandle, CaptureError>;

    async fn publish(
        &self,
        session: &SessionHandle,
        publisher: &PublisherHandle,
    ) -> Result<(), TransportError>;

    async fn unpublish(
        &self,
        session: &SessionHandle,
        publisher: &PublisherHandle,
    ) -> Result<(), TransportError>;

    /// Enable or disable video on a publisher. Enabling may carry a fresh track.
    async fn publish_video(
        &self,
        publisher: &PublisherHandle,
        enabled: bool,
        track: Option<MediaTrack>,
    ) -> Result<(), TransportError>;

    /// Mute or unmute audio on a publisher. Local operation, cannot fail.
    fn publish_audio(&self, publisher: &PublisherHandle, enabled: bool);

    async fn acquire_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream, CaptureError>;

    async fn replace_track(
        &self,
        publisher: &PublisherHandle,
        track: MediaTrack,
    ) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        session: &SessionHandle,
        stream_id: &StreamId,
    ) -> Result<SubscriberHandle, TransportError>;

    async fn subscribe_to_transcription(
        &self,
        session: &SessionHandle,
        subscriber: &SubscriberHandle,
        lang: &str,
    ) -> Result<(), TransportError>;

    async fn unsubscribe_from_transcription(
        &self,
        session: &SessionHandle,
        subscriber: &SubscriberHandle,
    ) -> Result<(), TransportError>;

    async fn signal(
        &self,
        session: &SessionHandle,
        signal: &OutboundSignal,
    ) -> Result<(), TransportError>;
}
