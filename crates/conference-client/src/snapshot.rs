//! Immutable views published by the directory.
//!
//! Consumers (UI, tests) never see the live entities; every mutation of the
//! directory publishes fresh snapshots derived from the live state.

use crate::participant::ParticipantRole;
use crate::transport::{MediaHandle, PublisherHandle};
use common::types::{ConnectionId, ParticipantId, StreamKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    pub connection_id: ConnectionId,
    pub kind: StreamKind,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub enlarged: bool,
    pub connected: bool,
    pub handle: MediaHandle,
}

impl StreamSnapshot {
    #[must_use]
    pub fn carries_live_audio(&self) -> bool {
        self.connected && self.audio_enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSnapshot {
    pub id: ParticipantId,
    pub nickname: String,
    pub role: ParticipantRole,
    pub is_local: bool,
    pub muted_forcibly: bool,
    /// Camera first, then screen.
    pub streams: Vec<StreamSnapshot>,
}

impl ParticipantSnapshot {
    #[must_use]
    pub fn stream(&self, kind: StreamKind) -> Option<&StreamSnapshot> {
        self.streams.iter().find(|s| s.kind == kind)
    }

    #[must_use]
    pub fn stream_by_connection(&self, connection_id: &ConnectionId) -> Option<&StreamSnapshot> {
        self.streams.iter().find(|s| &s.connection_id == connection_id)
    }

    #[must_use]
    pub fn publisher(&self, kind: StreamKind) -> Option<&PublisherHandle> {
        self.stream(kind).and_then(|s| s.handle.as_publisher())
    }

    #[must_use]
    pub fn is_active(&self, kind: StreamKind) -> bool {
        self.stream(kind).is_some_and(|s| s.connected)
    }

    #[must_use]
    pub fn is_camera_active(&self) -> bool {
        self.is_active(StreamKind::Camera)
    }

    #[must_use]
    pub fn is_screen_active(&self) -> bool {
        self.is_active(StreamKind::Screen)
    }

    #[must_use]
    pub fn is_camera_video_active(&self) -> bool {
        self.stream(StreamKind::Camera)
            .is_some_and(|s| s.connected && s.video_enabled)
    }

    #[must_use]
    pub fn carries_live_audio(&self, kind: StreamKind) -> bool {
        self.stream(kind).is_some_and(StreamSnapshot::carries_live_audio)
    }

    #[must_use]
    pub fn has_audio_active(&self) -> bool {
        self.streams.iter().any(StreamSnapshot::carries_live_audio)
    }

    #[must_use]
    pub fn enlarged_connections(&self) -> Vec<&ConnectionId> {
        self.streams
            .iter()
            .filter(|s| s.enlarged)
            .map(|s| &s.connection_id)
            .collect()
    }
}
