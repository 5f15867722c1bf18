//! Participant entity.
//!
//! One local or remote user with at most one [`StreamConnection`] per
//! [`StreamKind`]. Mutators are synchronous, touch only this entity and never
//! notify; the directory publishes snapshots after it mutates. Mutating a
//! kind the participant does not have is a no-op reported as `false`.

use crate::snapshot::{ParticipantSnapshot, StreamSnapshot};
use crate::transport::{MediaHandle, PublisherHandle, SubscriberHandle};
use common::types::{ConnectionId, ParticipantId, StreamKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role granted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Subscriber,
    #[default]
    Publisher,
    Moderator,
}

/// One physical media connection of a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConnection {
    connection_id: ConnectionId,
    kind: StreamKind,
    video_enabled: bool,
    audio_enabled: bool,
    enlarged: bool,
    connected: bool,
    handle: MediaHandle,
}

impl StreamConnection {
    /// New connection with video and audio on. Screens start enlarged.
    #[must_use]
    pub fn new(connection_id: ConnectionId, kind: StreamKind, handle: MediaHandle) -> Self {
        Self {
            connection_id,
            kind,
            video_enabled: true,
            audio_enabled: true,
            enlarged: kind == StreamKind::Screen,
            connected: true,
            handle,
        }
    }

    /// Local connection backed by a publisher.
    #[must_use]
    pub fn local(connection_id: ConnectionId, kind: StreamKind, publisher: PublisherHandle) -> Self {
        Self::new(connection_id, kind, MediaHandle::Publisher(publisher))
    }

    /// Remote connection backed by a subscriber.
    #[must_use]
    pub fn remote(
        connection_id: ConnectionId,
        kind: StreamKind,
        subscriber: SubscriberHandle,
    ) -> Self {
        Self::new(connection_id, kind, MediaHandle::Subscriber(subscriber))
    }

    #[must_use]
    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_enlarged(mut self, enlarged: bool) -> Self {
        self.enlarged = enlarged;
        self
    }

    #[must_use]
    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    #[must_use]
    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    #[must_use]
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    #[must_use]
    pub fn enlarged(&self) -> bool {
        self.enlarged
    }

    #[must_use]
    pub fn connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn handle(&self) -> &MediaHandle {
        &self.handle
    }

    /// Whether this connection is currently audible.
    #[must_use]
    pub fn carries_live_audio(&self) -> bool {
        self.connected && self.audio_enabled
    }

    #[must_use]
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            connection_id: self.connection_id.clone(),
            kind: self.kind,
            video_enabled: self.video_enabled,
            audio_enabled: self.audio_enabled,
            enlarged: self.enlarged,
            connected: self.connected,
            handle: self.handle.clone(),
        }
    }
}

/// A local or remote user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    id: ParticipantId,
    nickname: String,
    role: ParticipantRole,
    is_local: bool,
    muted_forcibly: bool,
    streams: BTreeMap<StreamKind, StreamConnection>,
}

impl Participant {
    #[must_use]
    pub fn local(id: ParticipantId, nickname: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            role,
            is_local: true,
            muted_forcibly: false,
            streams: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn remote(id: ParticipantId, nickname: impl Into<String>, connection: StreamConnection) -> Self {
        let mut streams = BTreeMap::new();
        streams.insert(connection.kind(), connection);
        Self {
            id,
            nickname: nickname.into(),
            role: ParticipantRole::Publisher,
            is_local: false,
            muted_forcibly: false,
            streams,
        }
    }

    /// Builder-style helper for attaching the first connection.
    #[must_use]
    pub fn with_connection(mut self, connection: StreamConnection) -> Self {
        self.add_connection(connection);
        self
    }

    #[must_use]
    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    #[must_use]
    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    #[must_use]
    pub fn muted_forcibly(&self) -> bool {
        self.muted_forcibly
    }

    #[must_use]
    pub fn connection(&self, kind: StreamKind) -> Option<&StreamConnection> {
        self.streams.get(&kind)
    }

    pub fn connections(&self) -> impl Iterator<Item = &StreamConnection> {
        self.streams.values()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.streams.len()
    }

    #[must_use]
    pub fn is_removable(&self) -> bool {
        self.streams.is_empty()
    }

    #[must_use]
    pub fn publisher(&self, kind: StreamKind) -> Option<&PublisherHandle> {
        self.streams.get(&kind).and_then(|c| c.handle.as_publisher())
    }

    #[must_use]
    pub fn subscriber(&self, kind: StreamKind) -> Option<&SubscriberHandle> {
        self.streams.get(&kind).and_then(|c| c.handle.as_subscriber())
    }

    // --- queries ---

    /// A kind is active when it has a connected connection.
    #[must_use]
    pub fn is_kind_active(&self, kind: StreamKind) -> bool {
        self.streams.get(&kind).is_some_and(|c| c.connected)
    }

    #[must_use]
    pub fn has_connection_id(&self, connection_id: &ConnectionId) -> bool {
        self.streams
            .values()
            .any(|c| &c.connection_id == connection_id)
    }

    #[must_use]
    pub fn has_connection_kind(&self, kind: StreamKind) -> bool {
        self.streams.contains_key(&kind)
    }

    #[must_use]
    pub fn kind_of(&self, connection_id: &ConnectionId) -> Option<StreamKind> {
        self.streams
            .values()
            .find(|c| &c.connection_id == connection_id)
            .map(|c| c.kind)
    }

    #[must_use]
    pub fn is_camera_active(&self) -> bool {
        self.is_kind_active(StreamKind::Camera)
    }

    #[must_use]
    pub fn is_screen_active(&self) -> bool {
        self.is_kind_active(StreamKind::Screen)
    }

    /// Camera connected and sending video.
    #[must_use]
    pub fn is_camera_video_active(&self) -> bool {
        self.streams
            .get(&StreamKind::Camera)
            .is_some_and(|c| c.connected && c.video_enabled)
    }

    #[must_use]
    pub fn carries_live_audio(&self, kind: StreamKind) -> bool {
        self.streams
            .get(&kind)
            .is_some_and(StreamConnection::carries_live_audio)
    }

    /// Camera or screen carrying live audio.
    #[must_use]
    pub fn has_audio_active(&self) -> bool {
        self.streams.values().any(StreamConnection::carries_live_audio)
    }

    #[must_use]
    pub fn some_enlarged(&self) -> bool {
        self.streams.values().any(|c| c.enlarged)
    }

    // --- mutators ---

    pub fn set_nickname(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
    }

    pub fn set_role(&mut self, role: ParticipantRole) {
        self.role = role;
    }

    pub fn set_muted_forcibly(&mut self, muted: bool) {
        self.muted_forcibly = muted;
    }

    fn with_kind(&mut self, kind: StreamKind, f: impl FnOnce(&mut StreamConnection)) -> bool {
        match self.streams.get_mut(&kind) {
            Some(connection) => {
                f(connection);
                true
            }
            None => false,
        }
    }

    pub fn enable(&mut self, kind: StreamKind) -> bool {
        self.with_kind(kind, |c| c.connected = true)
    }

    pub fn disable(&mut self, kind: StreamKind) -> bool {
        self.with_kind(kind, |c| c.connected = false)
    }

    pub fn set_video_enabled(&mut self, kind: StreamKind, enabled: bool) -> bool {
        self.with_kind(kind, |c| c.video_enabled = enabled)
    }

    pub fn set_audio_enabled(&mut self, kind: StreamKind, enabled: bool) -> bool {
        self.with_kind(kind, |c| c.audio_enabled = enabled)
    }

    pub fn set_enlarged(&mut self, kind: StreamKind, enlarged: bool) -> bool {
        self.with_kind(kind, |c| c.enlarged = enlarged)
    }

    pub fn set_connection_id(&mut self, kind: StreamKind, connection_id: ConnectionId) -> bool {
        self.with_kind(kind, |c| c.connection_id = connection_id)
    }

    /// Replace the publisher or subscriber handle in place.
    pub fn set_handle(&mut self, kind: StreamKind, handle: MediaHandle) -> bool {
        self.with_kind(kind, |c| c.handle = handle)
    }

    /// Flip the enlarged flag of the connection with this id.
    pub fn toggle_enlarged(&mut self, connection_id: &ConnectionId) -> bool {
        match self
            .streams
            .values_mut()
            .find(|c| &c.connection_id == connection_id)
        {
            Some(connection) => {
                connection.enlarged = !connection.enlarged;
                true
            }
            None => false,
        }
    }

    pub fn set_all_enlarged(&mut self, enlarged: bool) {
        for connection in self.streams.values_mut() {
            connection.enlarged = enlarged;
        }
    }

    /// Add a connection. Returns `false` (and keeps the existing one) when
    /// this kind is already present.
    pub fn add_connection(&mut self, connection: StreamConnection) -> bool {
        if self.streams.contains_key(&connection.kind) {
            return false;
        }
        self.streams.insert(connection.kind, connection);
        true
    }

    /// Remove the connection with this id, returning it.
    pub fn remove_connection(&mut self, connection_id: &ConnectionId) -> Option<StreamConnection> {
        let kind = self.kind_of(connection_id)?;
        self.streams.remove(&kind)
    }

    #[must_use]
    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id.clone(),
            nickname: self.nickname.clone(),
            role: self.role,
            is_local: self.is_local,
            muted_forcibly: self.muted_forcibly,
            streams: self.streams.values().map(StreamConnection::snapshot).collect(),
        }
    }
}
