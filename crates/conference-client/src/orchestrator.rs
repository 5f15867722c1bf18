//! Action orchestrator.
//!
//! Entry points for user intents (camera, microphone, screen share, track
//! replacement, nickname, join/leave). Each one reads the local snapshot,
//! then sequences coordinator and directory calls. The directory only
//! records steps that completed: when a transport call fails the error is
//! returned and the flags reflect what actually happened.
//!
//! The local participant never has both camera and screen carrying live
//! audio: whenever audio moves, the source is silenced before the target
//! is enabled.

use crate::coordinator::{
    ConnectOutcome, DualSessionCoordinator, PublishOutcome, SessionIdentity,
};
use crate::directory::ParticipantDirectory;
use crate::errors::ClientError;
use crate::metadata::NicknamePayload;
use crate::observability::metrics;
use crate::participant::{Participant, ParticipantRole, StreamConnection};
use crate::snapshot::ParticipantSnapshot;
use crate::stt::SttSubscriptionManager;
use crate::transport::{CaptureConstraints, PublisherHandle, SignalType};
use common::secret::SecretString;
use common::types::{ConnectionId, ParticipantId, SessionKind, StreamKind};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Everything needed to join a conference.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub role: ParticipantRole,
    pub webcam_token: SecretString,
    /// Ignored where screen capture is unsupported.
    pub screen_token: Option<SecretString>,
    pub video: bool,
    pub audio: bool,
}

fn record(action: &'static str, result: &Result<(), ClientError>) {
    let outcome = match result {
        Ok(()) => "ok",
        Err(e) => e.metric_label(),
    };
    metrics::record_toggle(action, outcome);
}

/// Compound transitions over the coordinator and the directory.
pub struct ActionOrchestrator {
    coordinator: Arc<DualSessionCoordinator>,
    directory: Arc<ParticipantDirectory>,
    stt: SttSubscriptionManager,
}

impl ActionOrchestrator {
    #[must_use]
    pub fn new(
        coordinator: Arc<DualSessionCoordinator>,
        directory: Arc<ParticipantDirectory>,
        stt: SttSubscriptionManager,
    ) -> Self {
        Self {
            coordinator,
            directory,
            stt,
        }
    }

    fn local(&self) -> Result<ParticipantSnapshot, ClientError> {
        self.directory
            .local_snapshot()
            .ok_or(ClientError::NotInitialized)
    }

    fn identity(local: &ParticipantSnapshot) -> SessionIdentity {
        SessionIdentity {
            participant_id: local.id.clone(),
            nickname: local.nickname.clone(),
        }
    }

    fn publisher(local: &ParticipantSnapshot, kind: StreamKind) -> Result<PublisherHandle, ClientError> {
        local
            .publisher(kind)
            .cloned()
            .ok_or(ClientError::PublisherMissing(kind))
    }

    // --- predicates ---

    #[must_use]
    pub fn is_my_camera_active(&self) -> bool {
        self.directory
            .local_snapshot()
            .is_some_and(|p| p.is_camera_active())
    }

    #[must_use]
    pub fn is_my_screen_active(&self) -> bool {
        self.directory
            .local_snapshot()
            .is_some_and(|p| p.is_screen_active())
    }

    #[must_use]
    pub fn have_i_camera_and_screen_active(&self) -> bool {
        self.is_my_camera_active() && self.is_my_screen_active()
    }

    #[must_use]
    pub fn is_only_my_screen_active(&self) -> bool {
        self.is_my_screen_active() && !self.is_my_camera_active()
    }

    #[must_use]
    pub fn is_my_video_active(&self) -> bool {
        self.directory
            .local_snapshot()
            .is_some_and(|p| p.is_camera_video_active())
    }

    #[must_use]
    pub fn is_my_audio_active(&self) -> bool {
        self.directory
            .local_snapshot()
            .is_some_and(|p| p.has_audio_active())
    }

    // --- building blocks ---

    /// Connect a session (idempotent) and return its connection id. The
    /// webcam connection id replaces the camera's rendezvous id.
    async fn ensure_connected(
        &self,
        kind: SessionKind,
        identity: &SessionIdentity,
    ) -> Result<ConnectionId, ClientError> {
        match self.coordinator.connect(kind, identity).await? {
            ConnectOutcome::Connected(connection_id) => {
                if kind == SessionKind::Webcam
                    && !self
                        .directory
                        .set_local_connection_id(StreamKind::Camera, connection_id.clone())
                        .await
                {
                    debug!(
                        target: "cc.orchestrator",
                        connection_id = %connection_id,
                        "No local camera connection to resolve"
                    );
                }
                Ok(connection_id)
            }
            ConnectOutcome::AlreadyConnected => {
                self.coordinator.connection_id(kind).await.ok_or_else(|| {
                    ClientError::Internal(format!("{kind} session connected without an id"))
                })
            }
        }
    }

    /// Turn camera video on (fresh capture from the selected camera) or off.
    async fn publish_video_aux(&self, camera: &PublisherHandle, publish: bool) -> Result<(), ClientError> {
        if publish {
            let devices = self.coordinator.selected_devices().await;
            let stream = self
                .coordinator
                .acquire_capture(&CaptureConstraints::video_only(devices.camera_source()))
                .await?;
            self.coordinator
                .publish_video(camera, true, stream.video)
                .await?;
        } else {
            self.coordinator.publish_video(camera, false, None).await?;
        }
        self.directory
            .update_local(|p| p.set_video_enabled(StreamKind::Camera, publish))
            .await;
        Ok(())
    }

    async fn publish_audio_aux(&self, kind: StreamKind, publisher: &PublisherHandle, enabled: bool) {
        self.coordinator.publish_audio(publisher, enabled);
        self.directory
            .update_local(|p| p.set_audio_enabled(kind, enabled))
            .await;
    }

    /// Publish the camera on the webcam session, failing on missing capability.
    async fn publish_camera(&self, camera: &PublisherHandle) -> Result<(), ClientError> {
        match self.coordinator.publish(StreamKind::Camera, camera).await? {
            PublishOutcome::Published => Ok(()),
            PublishOutcome::NotPublishable => Err(ClientError::NotPublishable(SessionKind::Webcam)),
        }
    }

    /// Unpublish the local screen, then drop its stream. A failed unpublish
    /// leaves the stream in the directory.
    async fn drop_screen(&self, local: &ParticipantSnapshot) -> Result<(), ClientError> {
        let screen = Self::publisher(local, StreamKind::Screen)?;
        self.coordinator.unpublish(StreamKind::Screen, &screen).await?;
        if let Some(stream) = local.stream(StreamKind::Screen) {
            self.directory
                .remove_by_connection_id(&stream.connection_id)
                .await;
        }
        Ok(())
    }

    // --- join / leave ---

    /// Initialize the sessions, create the local participant with its camera
    /// publisher (under the rendezvous id), connect the webcam session and
    /// publish.
    #[instrument(skip_all, name = "cc.orchestrator.join", fields(participant_id = %request.participant_id))]
    pub async fn join(&self, request: JoinRequest) -> Result<(), ClientError> {
        self.coordinator.initialize().await?;
        self.coordinator
            .set_token(SessionKind::Webcam, request.webcam_token)
            .await?;
        if let Some(token) = request.screen_token {
            if self.coordinator.supports_screen_capture() {
                self.coordinator.set_token(SessionKind::Screen, token).await?;
            }
        }

        let publisher = self
            .coordinator
            .init_camera_publisher(request.video, request.audio)
            .await?;

        let mut participant = Participant::local(
            request.participant_id.clone(),
            request.nickname.clone(),
            request.role,
        );
        if let Some(publisher) = publisher.clone() {
            participant = participant.with_connection(
                StreamConnection::local(
                    ConnectionId::from(&request.participant_id),
                    StreamKind::Camera,
                    publisher,
                )
                .with_video(request.video)
                .with_audio(request.audio),
            );
        }
        if !self.directory.set_local(participant).await {
            return Err(ClientError::Conflict("already joined".to_string()));
        }

        let identity = SessionIdentity {
            participant_id: request.participant_id,
            nickname: request.nickname,
        };
        self.ensure_connected(SessionKind::Webcam, &identity).await?;

        if let Some(publisher) = publisher {
            if self.coordinator.publish(StreamKind::Camera, &publisher).await?
                == PublishOutcome::NotPublishable
            {
                warn!(
                    target: "cc.orchestrator",
                    "Joined without publish capability, camera stays local"
                );
            }
        }

        info!(target: "cc.orchestrator", "Joined");
        Ok(())
    }

    /// Cancel the transcription retry, disconnect both sessions and clear
    /// the directory.
    #[instrument(skip_all, name = "cc.orchestrator.leave")]
    pub async fn leave(&self) {
        self.stt.unsubscribe().await;
        self.coordinator.disconnect_all().await;
        self.directory.clear().await;
        info!(target: "cc.orchestrator", "Left");
    }

    // --- toggles ---

    /// Camera video on/off.
    ///
    /// - both active, off: stop camera video, disable and unpublish the
    ///   camera, hand the previous audio state to the screen
    /// - only screen active, on: connect the webcam session, publish the
    ///   camera with a fresh capture, move the microphone from the screen
    /// - otherwise: plain mute/unmute of the camera publisher
    #[instrument(skip_all, name = "cc.orchestrator.publish_video", fields(publish))]
    pub async fn publish_video(&self, publish: bool) -> Result<(), ClientError> {
        let result = self.publish_video_inner(publish).await;
        record("video", &result);
        result
    }

    async fn publish_video_inner(&self, publish: bool) -> Result<(), ClientError> {
        let local = self.local()?;
        let camera_active = local.is_camera_active();
        let screen_active = local.is_screen_active();

        if camera_active && screen_active && !publish {
            let previous_audio = local.has_audio_active();
            let camera = Self::publisher(&local, StreamKind::Camera)?;
            let screen = Self::publisher(&local, StreamKind::Screen)?;

            self.publish_video_aux(&camera, false).await?;
            self.coordinator.unpublish(StreamKind::Camera, &camera).await?;
            self.directory
                .update_local(|p| p.disable(StreamKind::Camera))
                .await;
            self.publish_audio_aux(StreamKind::Camera, &camera, false).await;
            self.publish_audio_aux(StreamKind::Screen, &screen, previous_audio)
                .await;

            info!(
                target: "cc.orchestrator",
                screen_audio = previous_audio,
                "Camera dropped, screen carries audio"
            );
            return Ok(());
        }

        if screen_active && !camera_active {
            if !publish {
                debug!(target: "cc.orchestrator", "Camera already off");
                return Ok(());
            }
            let has_audio = local.carries_live_audio(StreamKind::Screen);
            let camera = Self::publisher(&local, StreamKind::Camera)?;
            let screen = Self::publisher(&local, StreamKind::Screen)?;

            self.ensure_connected(SessionKind::Webcam, &Self::identity(&local))
                .await?;
            self.publish_camera(&camera).await?;
            if let Err(e) = self.publish_video_aux(&camera, true).await {
                if let Err(rollback) = self.coordinator.unpublish(StreamKind::Camera, &camera).await {
                    warn!(
                        target: "cc.orchestrator",
                        error = %rollback,
                        "Camera rollback unpublish failed"
                    );
                }
                return Err(e);
            }
            self.publish_audio_aux(StreamKind::Screen, &screen, false).await;
            self.publish_audio_aux(StreamKind::Camera, &camera, has_audio)
                .await;
            self.directory
                .update_local(|p| p.enable(StreamKind::Camera))
                .await;

            info!(
                target: "cc.orchestrator",
                camera_audio = has_audio,
                "Camera restored alongside screen"
            );
            return Ok(());
        }

        let camera = Self::publisher(&local, StreamKind::Camera)?;
        self.publish_video_aux(&camera, publish).await
    }

    /// Microphone on/off on whichever stream carries audio.
    #[instrument(skip_all, name = "cc.orchestrator.publish_audio", fields(publish))]
    pub async fn publish_audio(&self, publish: bool) -> Result<(), ClientError> {
        let result = self.publish_audio_inner(publish).await;
        record("audio", &result);
        result
    }

    async fn publish_audio_inner(&self, publish: bool) -> Result<(), ClientError> {
        let local = self.local()?;

        if local.is_camera_active() {
            let camera = Self::publisher(&local, StreamKind::Camera)?;
            if local.carries_live_audio(StreamKind::Screen) {
                let screen = Self::publisher(&local, StreamKind::Screen)?;
                self.publish_audio_aux(StreamKind::Screen, &screen, false).await;
            }
            self.publish_audio_aux(StreamKind::Camera, &camera, publish)
                .await;
        } else {
            let screen = Self::publisher(&local, StreamKind::Screen)?;
            self.publish_audio_aux(StreamKind::Screen, &screen, publish)
                .await;
        }
        Ok(())
    }

    /// Start or stop sharing the screen.
    #[instrument(skip_all, name = "cc.orchestrator.toggle_screenshare")]
    pub async fn toggle_screenshare(&self) -> Result<(), ClientError> {
        let result = self.toggle_screenshare_inner().await;
        record("screen", &result);
        result
    }

    async fn toggle_screenshare_inner(&self) -> Result<(), ClientError> {
        let local = self.local()?;
        let camera_active = local.is_camera_active();
        let screen_active = local.is_screen_active();

        if camera_active && screen_active {
            self.stop_screen(&local).await
        } else if screen_active {
            self.swap_screen_for_camera(&local).await
        } else {
            self.start_screen(&local).await
        }
    }

    /// Camera and screen active: drop the screen, audio goes back to the camera.
    async fn stop_screen(&self, local: &ParticipantSnapshot) -> Result<(), ClientError> {
        let screen_had_audio = local.carries_live_audio(StreamKind::Screen);
        self.drop_screen(local).await?;

        if screen_had_audio {
            let camera = Self::publisher(local, StreamKind::Camera)?;
            self.publish_audio_aux(StreamKind::Camera, &camera, true).await;
        }
        info!(target: "cc.orchestrator", "Screen share stopped");
        Ok(())
    }

    /// Only the screen active: bring the camera back with the screen's audio
    /// state, then drop the screen.
    async fn swap_screen_for_camera(&self, local: &ParticipantSnapshot) -> Result<(), ClientError> {
        let has_audio = local.carries_live_audio(StreamKind::Screen);
        let camera = Self::publisher(local, StreamKind::Camera)?;
        let screen = Self::publisher(local, StreamKind::Screen)?;

        self.ensure_connected(SessionKind::Webcam, &Self::identity(local))
            .await?;
        self.publish_camera(&camera).await?;

        self.publish_audio_aux(StreamKind::Screen, &screen, false).await;
        self.publish_audio_aux(StreamKind::Camera, &camera, has_audio)
            .await;
        self.directory
            .update_local(|p| p.enable(StreamKind::Camera))
            .await;
        self.drop_screen(local).await?;

        info!(
            target: "cc.orchestrator",
            camera_audio = has_audio,
            "Screen share replaced by camera"
        );
        Ok(())
    }

    /// Start sharing with a fresh screen publisher.
    async fn start_screen(&self, local: &ParticipantSnapshot) -> Result<(), ClientError> {
        if !self.coordinator.supports_screen_capture() {
            return Err(ClientError::ScreenShareUnavailable);
        }

        let camera_video_active = local.is_camera_video_active();
        let has_audio = !camera_video_active && local.has_audio_active();

        let publisher = self.coordinator.init_screen_publisher(has_audio).await?;
        let connection_id = self
            .ensure_connected(SessionKind::Screen, &Self::identity(local))
            .await?;

        let added = self
            .directory
            .add_local_connection(
                StreamConnection::local(connection_id.clone(), StreamKind::Screen, publisher.clone())
                    .with_audio(false),
            )
            .await;
        if !added {
            return Err(ClientError::Conflict(format!(
                "screen connection {connection_id} could not be added"
            )));
        }

        let published = self
            .coordinator
            .publish(StreamKind::Screen, &publisher)
            .await
            .and_then(|outcome| match outcome {
                PublishOutcome::Published => Ok(()),
                PublishOutcome::NotPublishable => {
                    Err(ClientError::NotPublishable(SessionKind::Screen))
                }
            });
        if let Err(e) = published {
            self.directory.remove_by_connection_id(&connection_id).await;
            return Err(e);
        }

        // The screen publisher went live with `has_audio`.
        if has_audio {
            if local.carries_live_audio(StreamKind::Camera) {
                let camera = Self::publisher(local, StreamKind::Camera)?;
                self.publish_audio_aux(StreamKind::Camera, &camera, false).await;
            }
            self.directory
                .update_local(|p| p.set_audio_enabled(StreamKind::Screen, true))
                .await;
        }

        if !camera_video_active && local.is_camera_active() {
            let camera = Self::publisher(local, StreamKind::Camera)?;
            self.coordinator.unpublish(StreamKind::Camera, &camera).await?;
            self.directory
                .update_local(|p| p.disable(StreamKind::Camera))
                .await;
        }

        info!(
            target: "cc.orchestrator",
            connection_id = %connection_id,
            screen_audio = has_audio,
            "Screen share started"
        );
        Ok(())
    }

    /// The native "stop sharing" control ended the screen track.
    pub async fn on_screen_track_ended(&self) -> Result<(), ClientError> {
        if self.is_my_screen_active() {
            self.toggle_screenshare().await
        } else {
            Ok(())
        }
    }

    /// Swap in a freshly captured track (new device) without republishing.
    #[instrument(skip_all, name = "cc.orchestrator.replace_track", fields(kind = %kind))]
    pub async fn replace_track(
        &self,
        kind: StreamKind,
        constraints: CaptureConstraints,
    ) -> Result<(), ClientError> {
        let result: Result<(), ClientError> = async {
            let local = self.local()?;
            let publisher = Self::publisher(&local, kind)?;
            self.coordinator
                .replace_track(kind, &publisher, &constraints)
                .await
        }
        .await;
        record("track", &result);
        result
    }

    /// Change the local nickname and tell the others when it differs from
    /// the identity the webcam session connected with.
    #[instrument(skip_all, name = "cc.orchestrator.set_nickname")]
    pub async fn set_nickname(&self, nickname: &str) -> Result<(), ClientError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            debug!(target: "cc.orchestrator", "Ignoring empty nickname");
            return Ok(());
        }

        let result: Result<(), ClientError> = async {
            self.directory
                .update_local(|p| p.set_nickname(nickname))
                .await
                .ok_or(ClientError::NotInitialized)?;

            if self.coordinator.is_connected(SessionKind::Webcam).await
                && self.coordinator.needs_nickname_signal(nickname).await
            {
                let data = serde_json::to_string(&NicknamePayload {
                    client_data: nickname.to_string(),
                })?;
                self.coordinator
                    .send_signal(SignalType::NicknameChanged, data, Vec::new())
                    .await?;
            }
            Ok(())
        }
        .await;
        record("nickname", &result);
        result
    }
}
