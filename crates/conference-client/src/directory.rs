//! Participant directory.
//!
//! Single writer for participant state: the local participant (absent until
//! `set_local`, kept until `clear`) and the remote participants in arrival
//! order. State lives behind one async mutex. Every mutation republishes
//! snapshots from the live state inside the same critical section, so the
//! last published value always reflects every completed mutation.
//!
//! Invariants maintained here:
//! - connection ids are unique across local and remote connections
//! - no remote participant is kept with zero connections
//! - after a screen connection goes away at most one screen stays enlarged

use crate::observability::metrics;
use crate::participant::{Participant, StreamConnection};
use crate::snapshot::ParticipantSnapshot;
use crate::transport::{MediaHandle, SubscriberHandle};
use common::types::{ConnectionId, ParticipantId, StreamKind};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// A remote connection reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnection {
    pub connection_id: ConnectionId,
    pub kind: StreamKind,
    /// Logical participant advertised in the connection metadata.
    pub participant_hint: Option<ParticipantId>,
    pub nickname: String,
    pub subscriber: SubscriberHandle,
}

/// How an upsert was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Existing connection of this kind got a new handle and id.
    Refreshed(ParticipantId),
    /// Existing participant gained a connection of a new kind.
    Added(ParticipantId),
    /// A new remote participant was created.
    Created(ParticipantId),
    /// The connection id or participant id clashed with another owner.
    Rejected,
}

/// Record of a removed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedConnection {
    pub participant_id: ParticipantId,
    pub connection: StreamConnection,
    pub was_local: bool,
    /// The remote owner had no connections left and was deleted.
    pub participant_removed: bool,
}

#[derive(Debug, Default)]
struct DirectoryState {
    local: Option<Participant>,
    remotes: Vec<Participant>,
}

impl DirectoryState {
    fn remote_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.remotes.iter_mut().find(|p| p.id() == id)
    }

    fn remote_owning_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Participant> {
        self.remotes
            .iter_mut()
            .find(|p| p.has_connection_id(connection_id))
    }

    fn remote_owns(&self, connection_id: &ConnectionId) -> bool {
        self.remotes.iter().any(|p| p.has_connection_id(connection_id))
    }

    fn local_owns(&self, connection_id: &ConnectionId) -> bool {
        self.local
            .as_ref()
            .is_some_and(|p| p.has_connection_id(connection_id))
    }

    fn reset_all_enlarged(&mut self) {
        if let Some(local) = self.local.as_mut() {
            local.set_all_enlarged(false);
        }
        for remote in &mut self.remotes {
            remote.set_all_enlarged(false);
        }
    }

    /// Latest remote screen wins, then the local screen.
    fn reconcile_after_screen_removal(&mut self) {
        self.reset_all_enlarged();

        if let Some(remote) = self
            .remotes
            .iter_mut()
            .rev()
            .find(|p| p.is_screen_active())
        {
            remote.set_enlarged(StreamKind::Screen, true);
        } else if let Some(local) = self.local.as_mut().filter(|p| p.is_screen_active()) {
            local.set_enlarged(StreamKind::Screen, true);
        }
    }
}

/// Owner of local and remote participant state.
pub struct ParticipantDirectory {
    state: Mutex<DirectoryState>,
    local_tx: watch::Sender<Option<ParticipantSnapshot>>,
    remotes_tx: watch::Sender<Vec<ParticipantSnapshot>>,
}

impl Default for ParticipantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantDirectory {
    #[must_use]
    pub fn new() -> Self {
        let (local_tx, _) = watch::channel(None);
        let (remotes_tx, _) = watch::channel(Vec::new());
        Self {
            state: Mutex::new(DirectoryState::default()),
            local_tx,
            remotes_tx,
        }
    }

    /// Publish both snapshot sets; receivers are only woken on change.
    fn publish(&self, state: &DirectoryState) {
        let local = state.local.as_ref().map(Participant::snapshot);
        self.local_tx.send_if_modified(|current| {
            if *current == local {
                false
            } else {
                *current = local;
                true
            }
        });

        let remotes: Vec<ParticipantSnapshot> =
            state.remotes.iter().map(Participant::snapshot).collect();
        metrics::set_remote_participants(remotes.len());
        self.remotes_tx.send_if_modified(|current| {
            if *current == remotes {
                false
            } else {
                *current = remotes;
                true
            }
        });
    }

    // --- read side ---

    #[must_use]
    pub fn subscribe_local(&self) -> watch::Receiver<Option<ParticipantSnapshot>> {
        self.local_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_remotes(&self) -> watch::Receiver<Vec<ParticipantSnapshot>> {
        self.remotes_tx.subscribe()
    }

    #[must_use]
    pub fn local_snapshot(&self) -> Option<ParticipantSnapshot> {
        self.local_tx.borrow().clone()
    }

    #[must_use]
    pub fn remote_snapshots(&self) -> Vec<ParticipantSnapshot> {
        self.remotes_tx.borrow().clone()
    }

    #[must_use]
    pub fn remote_snapshot(&self, id: &ParticipantId) -> Option<ParticipantSnapshot> {
        self.remotes_tx
            .borrow()
            .iter()
            .find(|p| &p.id == id)
            .cloned()
    }

    /// Owner of a connection id, local or remote.
    pub async fn connection_owner(&self, connection_id: &ConnectionId) -> Option<ParticipantId> {
        let state = self.state.lock().await;
        state
            .local
            .iter()
            .chain(state.remotes.iter())
            .find(|p| p.has_connection_id(connection_id))
            .map(|p| p.id().clone())
    }

    pub async fn someone_is_sharing_screen(&self) -> bool {
        let state = self.state.lock().await;
        state.remotes.iter().any(Participant::is_screen_active)
    }

    /// Subscribers of every connected remote camera, in arrival order.
    pub async fn remote_camera_subscribers(&self) -> Vec<SubscriberHandle> {
        let state = self.state.lock().await;
        state
            .remotes
            .iter()
            .filter(|p| p.is_camera_active())
            .filter_map(|p| p.subscriber(StreamKind::Camera).cloned())
            .collect()
    }

    // --- local participant ---

    /// Install the local participant. A second call without `clear` is
    /// ignored and returns `false`.
    pub async fn set_local(&self, participant: Participant) -> bool {
        let mut state = self.state.lock().await;
        if state.local.is_some() {
            warn!(
                target: "cc.directory",
                participant_id = %participant.id(),
                "Local participant already set, ignoring"
            );
            return false;
        }
        if participant
            .connections()
            .any(|c| state.remote_owns(c.connection_id()))
        {
            warn!(
                target: "cc.directory",
                participant_id = %participant.id(),
                "Local participant connection id clashes with a remote, ignoring"
            );
            return false;
        }

        info!(
            target: "cc.directory",
            participant_id = %participant.id(),
            streams = participant.connection_count(),
            "Local participant set"
        );
        state.local = Some(participant);
        self.publish(&state);
        true
    }

    /// Apply a flag/nickname mutation to the local participant.
    ///
    /// Connection ids must go through [`Self::set_local_connection_id`] and
    /// new connections through [`Self::add_local_connection`] so uniqueness
    /// is checked. Returns `None` before `set_local`.
    pub async fn update_local<R>(&self, f: impl FnOnce(&mut Participant) -> R) -> Option<R> {
        let mut state = self.state.lock().await;
        let result = state.local.as_mut().map(f);
        if result.is_some() {
            self.publish(&state);
        }
        result
    }

    /// Resolve a local connection id (e.g. rendezvous id to transport id).
    pub async fn set_local_connection_id(
        &self,
        kind: StreamKind,
        connection_id: ConnectionId,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.remote_owns(&connection_id) {
            warn!(
                target: "cc.directory",
                connection_id = %connection_id,
                kind = %kind,
                "Connection id already owned by a remote participant"
            );
            return false;
        }
        let updated = state
            .local
            .as_mut()
            .is_some_and(|p| p.set_connection_id(kind, connection_id.clone()));
        if updated {
            debug!(
                target: "cc.directory",
                connection_id = %connection_id,
                kind = %kind,
                "Local connection id resolved"
            );
            self.publish(&state);
        }
        updated
    }

    /// Add a connection to the local participant. A screen connection resets
    /// every enlarged stream first.
    pub async fn add_local_connection(&self, connection: StreamConnection) -> bool {
        let mut state = self.state.lock().await;
        if state.local.is_none() || state.remote_owns(connection.connection_id()) {
            warn!(
                target: "cc.directory",
                connection_id = %connection.connection_id(),
                "Cannot add local connection"
            );
            return false;
        }
        if connection.kind() == StreamKind::Screen {
            state.reset_all_enlarged();
        }
        let added = state
            .local
            .as_mut()
            .is_some_and(|p| p.add_connection(connection));
        self.publish(&state);
        added
    }

    // --- remote participants ---

    /// Central reconciliation for remote connections.
    ///
    /// Resolution order:
    /// 1. hinted participant already has this kind: replace its handle and
    ///    adopt the new connection id
    /// 2. hinted participant exists: add the connection (screen resets every
    ///    enlarged stream first)
    /// 3. otherwise create the participant, keyed by the hint or by the
    ///    connection id
    pub async fn upsert_remote_by_connection(&self, connection: RemoteConnection) -> UpsertOutcome {
        let RemoteConnection {
            connection_id,
            kind,
            participant_hint,
            nickname,
            subscriber,
        } = connection;
        let participant_id =
            participant_hint.unwrap_or_else(|| ParticipantId::new(connection_id.as_str()));

        let mut state = self.state.lock().await;

        let clashes_with_local = state
            .local
            .as_ref()
            .is_some_and(|p| p.id() == &participant_id)
            || state.local_owns(&connection_id);
        if clashes_with_local {
            warn!(
                target: "cc.directory",
                connection_id = %connection_id,
                participant_id = %participant_id,
                "Remote connection clashes with the local participant, rejected"
            );
            return UpsertOutcome::Rejected;
        }

        let owned_elsewhere = state.remotes.iter().any(|p| {
            p.kind_of(&connection_id)
                .is_some_and(|owned_kind| p.id() != &participant_id || owned_kind != kind)
        });
        if owned_elsewhere {
            warn!(
                target: "cc.directory",
                connection_id = %connection_id,
                participant_id = %participant_id,
                kind = %kind,
                "Connection id already owned by a different connection, rejected"
            );
            return UpsertOutcome::Rejected;
        }

        let existing_has_kind = state
            .remotes
            .iter()
            .find(|p| p.id() == &participant_id)
            .map(|p| p.has_connection_kind(kind));

        let outcome = match existing_has_kind {
            Some(true) => {
                if let Some(participant) = state.remote_mut(&participant_id) {
                    participant.set_handle(kind, MediaHandle::Subscriber(subscriber));
                    participant.set_connection_id(kind, connection_id.clone());
                    participant.enable(kind);
                }
                UpsertOutcome::Refreshed(participant_id)
            }
            Some(false) => {
                if kind == StreamKind::Screen {
                    state.reset_all_enlarged();
                }
                if let Some(participant) = state.remote_mut(&participant_id) {
                    participant.add_connection(StreamConnection::remote(
                        connection_id.clone(),
                        kind,
                        subscriber,
                    ));
                }
                UpsertOutcome::Added(participant_id)
            }
            None => {
                if kind == StreamKind::Screen {
                    state.reset_all_enlarged();
                }
                state.remotes.push(Participant::remote(
                    participant_id.clone(),
                    nickname,
                    StreamConnection::remote(connection_id.clone(), kind, subscriber),
                ));
                UpsertOutcome::Created(participant_id)
            }
        };

        info!(
            target: "cc.directory",
            connection_id = %connection_id,
            kind = %kind,
            outcome = ?outcome,
            remotes = state.remotes.len(),
            "Remote connection upserted"
        );
        self.publish(&state);
        outcome
    }

    /// Remove a connection wherever it lives.
    ///
    /// A remote participant left without connections is deleted; the local
    /// participant is kept. Removing a screen re-elects the enlarged screen.
    pub async fn remove_by_connection_id(
        &self,
        connection_id: &ConnectionId,
    ) -> Option<RemovedConnection> {
        let mut state = self.state.lock().await;

        let removed = if state.local_owns(connection_id) {
            let local = state.local.as_mut()?;
            let connection = local.remove_connection(connection_id)?;
            RemovedConnection {
                participant_id: local.id().clone(),
                connection,
                was_local: true,
                participant_removed: false,
            }
        } else {
            let remote = state.remote_owning_mut(connection_id)?;
            let connection = remote.remove_connection(connection_id)?;
            let removed = RemovedConnection {
                participant_id: remote.id().clone(),
                connection,
                was_local: false,
                participant_removed: remote.is_removable(),
            };
            state.remotes.retain(|p| !p.is_removable());
            removed
        };

        if removed.connection.kind() == StreamKind::Screen {
            state.reconcile_after_screen_removal();
        }

        info!(
            target: "cc.directory",
            connection_id = %connection_id,
            participant_id = %removed.participant_id,
            kind = %removed.connection.kind(),
            participant_removed = removed.participant_removed,
            "Connection removed"
        );
        self.publish(&state);
        Some(removed)
    }

    /// Clear every enlarged flag. Idempotent.
    pub async fn reset_all_enlarged(&self) {
        let mut state = self.state.lock().await;
        state.reset_all_enlarged();
        self.publish(&state);
    }

    /// Flip the enlarged flag of any connection, local or remote.
    pub async fn toggle_enlarged(&self, connection_id: &ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let toggled = match state.local.as_mut() {
            Some(local) if local.has_connection_id(connection_id) => {
                local.toggle_enlarged(connection_id)
            }
            _ => state
                .remote_owning_mut(connection_id)
                .is_some_and(|p| p.toggle_enlarged(connection_id)),
        };
        if toggled {
            self.publish(&state);
        }
        toggled
    }

    pub async fn set_remote_nickname(&self, connection_id: &ConnectionId, nickname: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(remote) = state.remote_owning_mut(connection_id) else {
            debug!(
                target: "cc.directory",
                connection_id = %connection_id,
                "Nickname update for unknown connection"
            );
            return false;
        };
        remote.set_nickname(nickname);
        self.publish(&state);
        true
    }

    pub async fn set_remote_muted_forcibly(&self, participant_id: &ParticipantId, muted: bool) -> bool {
        let mut state = self.state.lock().await;
        let Some(remote) = state.remote_mut(participant_id) else {
            return false;
        };
        remote.set_muted_forcibly(muted);
        self.publish(&state);
        true
    }

    /// Update the media flags of a remote connection. `None` leaves a flag alone.
    pub async fn set_remote_media_flags(
        &self,
        connection_id: &ConnectionId,
        audio: Option<bool>,
        video: Option<bool>,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(remote) = state.remote_owning_mut(connection_id) else {
            return false;
        };
        let Some(kind) = remote.kind_of(connection_id) else {
            return false;
        };
        if let Some(audio) = audio {
            remote.set_audio_enabled(kind, audio);
        }
        if let Some(video) = video {
            remote.set_video_enabled(kind, video);
        }
        self.publish(&state);
        true
    }

    /// Drop everything, local participant included.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.local = None;
        state.remotes.clear();
        info!(target: "cc.directory", "Directory cleared");
        self.publish(&state);
    }
}
