//! Session event loop.
//!
//! Drains [`TransportEvent`]s into the directory and coordinator. Runs as a
//! spawned task until its cancellation token fires or the transport drops
//! the sender.

use crate::coordinator::DualSessionCoordinator;
use crate::directory::{ParticipantDirectory, RemoteConnection};
use crate::metadata::{ConnectionMetadata, NicknamePayload, SCREEN_NICKNAME_SUFFIX};
use crate::observability::metrics;
use crate::transport::{ReceivedSignal, SignalType, StreamId, StreamProperty, TransportEvent};
use common::types::{ConnectionId, ParticipantId, SessionKind, StreamKind};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Payload of a force-mute signal sent by a moderator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForceMutePayload {
    participant_id: ParticipantId,
    #[serde(default = "default_muted")]
    muted: bool,
}

fn default_muted() -> bool {
    true
}

/// Applies transport events to client state.
pub struct SessionEvents {
    coordinator: Arc<DualSessionCoordinator>,
    directory: Arc<ParticipantDirectory>,
    default_nickname: String,
}

impl SessionEvents {
    #[must_use]
    pub fn new(
        coordinator: Arc<DualSessionCoordinator>,
        directory: Arc<ParticipantDirectory>,
        default_nickname: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            directory,
            default_nickname: default_nickname.into(),
        }
    }

    /// Spawn the event loop.
    pub fn spawn(
        self,
        receiver: mpsc::Receiver<TransportEvent>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(receiver, cancel_token))
    }

    #[instrument(skip_all, name = "cc.events")]
    async fn run(self, mut receiver: mpsc::Receiver<TransportEvent>, cancel_token: CancellationToken) {
        info!(target: "cc.events", "Session event loop started");
        let mut processed: u64 = 0;

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!(
                        target: "cc.events",
                        "Session event loop received cancellation signal"
                    );
                    break;
                }

                event = receiver.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatch(event).await;
                            processed += 1;
                        }
                        None => {
                            info!(
                                target: "cc.events",
                                "Transport event channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.events",
            events_processed = processed,
            "Session event loop stopped"
        );
    }

    /// Apply one event.
    pub async fn dispatch(&self, event: TransportEvent) {
        metrics::record_transport_event(event.label());

        match event {
            TransportEvent::StreamCreated {
                session,
                connection_id,
                stream_id,
                data,
            } => {
                self.on_stream_created(session, connection_id, &stream_id, &data)
                    .await;
            }
            TransportEvent::ConnectionDestroyed {
                session,
                connection_id,
            } => {
                if self
                    .directory
                    .remove_by_connection_id(&connection_id)
                    .await
                    .is_none()
                {
                    debug!(
                        target: "cc.events",
                        session = %session,
                        connection_id = %connection_id,
                        "Destroyed connection was not tracked"
                    );
                }
            }
            TransportEvent::StreamPropertyChanged {
                connection_id,
                property,
                enabled,
            } => {
                let (audio, video) = match property {
                    StreamProperty::AudioActive => (Some(enabled), None),
                    StreamProperty::VideoActive => (None, Some(enabled)),
                };
                self.directory
                    .set_remote_media_flags(&connection_id, audio, video)
                    .await;
            }
            TransportEvent::Reconnecting { session } => {
                warn!(target: "cc.events", session = %session, "Connection lost, reconnecting");
                self.coordinator.set_connection_lost(true);
            }
            TransportEvent::Reconnected { session } => {
                info!(target: "cc.events", session = %session, "Connection restored");
                self.coordinator.set_connection_lost(false);
            }
            TransportEvent::SignalReceived(signal) => {
                self.on_signal(signal).await;
            }
        }
    }

    async fn on_stream_created(
        &self,
        session: SessionKind,
        connection_id: ConnectionId,
        stream_id: &StreamId,
        data: &str,
    ) {
        if self.coordinator.is_my_own_connection(&connection_id).await {
            debug!(
                target: "cc.events",
                connection_id = %connection_id,
                "Ignoring own stream"
            );
            return;
        }

        let metadata = ConnectionMetadata::parse(data);
        let subscriber = match self.coordinator.subscribe(session, stream_id).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                warn!(
                    target: "cc.events",
                    connection_id = %connection_id,
                    error = %e,
                    "Failed to subscribe to remote stream"
                );
                return;
            }
        };

        let mut nickname = metadata.nickname_or(&self.default_nickname);
        if metadata.kind == StreamKind::Screen {
            if let Some(stripped) = nickname.strip_suffix(SCREEN_NICKNAME_SUFFIX) {
                nickname = stripped.to_string();
            }
        }

        self.directory
            .upsert_remote_by_connection(RemoteConnection {
                connection_id,
                kind: metadata.kind,
                participant_hint: metadata.participant_id,
                nickname,
                subscriber,
            })
            .await;
    }

    async fn on_signal(&self, signal: ReceivedSignal) {
        let from_self = match signal.from.as_ref() {
            Some(from) => self.coordinator.is_my_own_connection(from).await,
            None => false,
        };

        match (&signal.kind, signal.from.as_ref()) {
            (SignalType::NicknameChanged, Some(from)) if !from_self => {
                if let Some(nickname) = NicknamePayload::parse(&signal.data) {
                    self.directory.set_remote_nickname(from, &nickname).await;
                }
            }
            (SignalType::ForceMute, _) => {
                self.on_force_mute(&signal.data).await;
            }
            _ => {}
        }

        debug!(
            target: "cc.events",
            signal = signal.kind.as_str(),
            from_self,
            "Signal received"
        );
        self.coordinator.broadcast_signal(signal);
    }

    async fn on_force_mute(&self, data: &str) {
        let payload: ForceMutePayload = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "cc.events", error = %e, "Malformed force-mute signal");
                return;
            }
        };

        let is_local = self
            .directory
            .local_snapshot()
            .is_some_and(|p| p.id == payload.participant_id);
        if is_local {
            self.directory
                .update_local(|p| p.set_muted_forcibly(payload.muted))
                .await;
        } else {
            self.directory
                .set_remote_muted_forcibly(&payload.participant_id, payload.muted)
                .await;
        }
    }
}
