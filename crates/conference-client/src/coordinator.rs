//! Dual-session transport coordinator.
//!
//! Owns the webcam and screen session slots, their tokens and connection
//! ids, the selected capture devices, and the outbound `connection_lost`
//! and signal channels. Every transport call the client makes goes through
//! here so it lands on the right session.
//!
//! Per-slot lifecycle: `Uninitialized -> Connecting -> Connected ->
//! Disconnected`. Connects on one slot are serialized by the slot mutex.

use crate::config::Config;
use crate::errors::ClientError;
use crate::metadata::ConnectionMetadata;
use crate::observability::metrics;
use crate::transport::{
    CaptureConstraints, CaptureError, CaptureSource, MediaStream, MediaTrack, MediaTransport,
    OutboundSignal, PublisherHandle, PublisherProperties, ReceivedSignal, SessionHandle,
    SignalType, StreamId, SubscriberHandle,
};
use common::secret::SecretString;
use common::types::{ConnectionId, ParticipantId, SessionKind, StreamKind};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Capacity of the received-signal broadcast channel.
const SIGNAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(ConnectionId),
    AlreadyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    NotPublishable,
}

/// Identity advertised in connection metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub participant_id: ParticipantId,
    pub nickname: String,
}

/// Execution-context flags that change coordinator behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub screen_capture_supported: bool,
    pub device_fallback_on_access_denied: bool,
}

impl From<&Config> for ExecutionContext {
    fn from(config: &Config) -> Self {
        Self {
            screen_capture_supported: config.screen_capture_supported,
            device_fallback_on_access_denied: config.device_fallback_on_access_denied,
        }
    }
}

/// Selected (and last-known-good) capture devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub camera: Option<String>,
    pub microphone: Option<String>,
}

impl DeviceSelection {
    #[must_use]
    pub fn camera_source(&self) -> CaptureSource {
        self.camera
            .clone()
            .map_or(CaptureSource::Default, CaptureSource::Device)
    }

    #[must_use]
    pub fn microphone_source(&self) -> CaptureSource {
        self.microphone
            .clone()
            .map_or(CaptureSource::Default, CaptureSource::Device)
    }
}

struct SessionSlot {
    kind: SessionKind,
    state: SessionState,
    handle: Option<SessionHandle>,
    token: Option<SecretString>,
    connection_id: Option<ConnectionId>,
    metadata: Option<ConnectionMetadata>,
}

impl SessionSlot {
    fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            state: SessionState::Uninitialized,
            handle: None,
            token: None,
            connection_id: None,
            metadata: None,
        }
    }

    fn release(&mut self) {
        self.state = SessionState::Disconnected;
        self.handle = None;
        self.token = None;
        self.connection_id = None;
        self.metadata = None;
        debug!(target: "cc.coordinator", session = %self.kind, "Session slot released");
    }
}

/// Owner of the two media sessions.
pub struct DualSessionCoordinator {
    transport: Arc<dyn MediaTransport>,
    context: ExecutionContext,
    webcam: Mutex<SessionSlot>,
    screen: Mutex<SessionSlot>,
    devices: RwLock<DeviceSelection>,
    connection_lost: watch::Sender<bool>,
    signals: broadcast::Sender<ReceivedSignal>,
}

impl DualSessionCoordinator {
    #[must_use]
    pub fn new(transport: Arc<dyn MediaTransport>, context: ExecutionContext) -> Self {
        let (connection_lost, _) = watch::channel(false);
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            transport,
            context,
            webcam: Mutex::new(SessionSlot::new(SessionKind::Webcam)),
            screen: Mutex::new(SessionSlot::new(SessionKind::Screen)),
            devices: RwLock::new(DeviceSelection::default()),
            connection_lost,
            signals,
        }
    }

    fn slot(&self, kind: SessionKind) -> &Mutex<SessionSlot> {
        match kind {
            SessionKind::Webcam => &self.webcam,
            SessionKind::Screen => &self.screen,
        }
    }

    #[must_use]
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    #[must_use]
    pub fn supports_screen_capture(&self) -> bool {
        self.context.screen_capture_supported
    }

    // --- lifecycle ---

    /// Create the session handles. The screen session is only created when
    /// the execution context can capture the screen. Slots that already have
    /// a handle are left alone.
    #[instrument(skip_all, name = "cc.coordinator.initialize")]
    pub async fn initialize(&self) -> Result<(), ClientError> {
        let mut kinds = vec![SessionKind::Webcam];
        if self.context.screen_capture_supported {
            kinds.push(SessionKind::Screen);
        } else {
            info!(
                target: "cc.coordinator",
                "Screen capture unsupported, screen session not created"
            );
        }

        for kind in kinds {
            let mut slot = self.slot(kind).lock().await;
            if slot.handle.is_some() {
                debug!(
                    target: "cc.coordinator",
                    session = %kind,
                    "Session already initialized"
                );
                continue;
            }
            let handle = self.transport.create_session(kind).await?;
            slot.handle = Some(handle);
            slot.state = SessionState::Uninitialized;
            debug!(target: "cc.coordinator", session = %kind, "Session created");
        }
        Ok(())
    }

    /// Store the token for the next connect. Write-once per connection cycle.
    pub async fn set_token(&self, kind: SessionKind, token: SecretString) -> Result<(), ClientError> {
        let mut slot = self.slot(kind).lock().await;
        if slot.token.is_some() {
            warn!(
                target: "cc.coordinator",
                session = %kind,
                "Token already set for this connection cycle"
            );
            return Err(ClientError::Conflict(format!(
                "token already set for {kind} session"
            )));
        }
        slot.token = Some(token);
        Ok(())
    }

    /// Connect one session.
    ///
    /// Returns [`ConnectOutcome::AlreadyConnected`] without a transport call
    /// when the session is connected. On failure the slot returns to its
    /// prior state and the error is surfaced; there is no retry.
    #[instrument(skip_all, name = "cc.coordinator.connect", fields(session = %kind))]
    pub async fn connect(
        &self,
        kind: SessionKind,
        identity: &SessionIdentity,
    ) -> Result<ConnectOutcome, ClientError> {
        let mut slot = self.slot(kind).lock().await;

        if slot.state == SessionState::Connected {
            debug!(target: "cc.coordinator", session = %kind, "Session already connected");
            metrics::record_session_connect(kind.as_str(), "already_connected");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let Some(handle) = slot.handle.clone() else {
            metrics::record_session_connect(kind.as_str(), "error");
            return Err(ClientError::SessionUnavailable(kind));
        };
        let Some(token) = slot.token.clone() else {
            metrics::record_session_connect(kind.as_str(), "error");
            return Err(ClientError::MissingToken(kind));
        };

        let metadata =
            ConnectionMetadata::for_session(kind, &identity.participant_id, &identity.nickname);
        let payload = metadata.to_json()?;

        let prior = slot.state;
        slot.state = SessionState::Connecting;

        match self.transport.connect(&handle, &token, &payload).await {
            Ok(connection_id) => {
                slot.state = SessionState::Connected;
                slot.connection_id = Some(connection_id.clone());
                slot.metadata = Some(metadata);
                info!(
                    target: "cc.coordinator",
                    session = %kind,
                    connection_id = %connection_id,
                    "Session connected"
                );
                metrics::record_session_connect(kind.as_str(), "connected");
                Ok(ConnectOutcome::Connected(connection_id))
            }
            Err(e) => {
                slot.state = prior;
                error!(
                    target: "cc.coordinator",
                    session = %kind,
                    error = %e,
                    "Session connect failed"
                );
                metrics::record_session_connect(kind.as_str(), "error");
                Err(e.into())
            }
        }
    }

    /// Disconnect one session. Valid from any state; releases the handle and
    /// token. Reuse requires [`Self::initialize`].
    #[instrument(skip_all, name = "cc.coordinator.disconnect", fields(session = %kind))]
    pub async fn disconnect(&self, kind: SessionKind) {
        let mut slot = self.slot(kind).lock().await;
        if let Some(handle) = slot.handle.as_ref() {
            self.transport.disconnect(handle).await;
        }
        slot.release();
        info!(target: "cc.coordinator", session = %kind, "Session disconnected");
    }

    pub async fn disconnect_all(&self) {
        self.disconnect(SessionKind::Webcam).await;
        self.disconnect(SessionKind::Screen).await;
        self.connection_lost.send_replace(false);
    }

    pub async fn state(&self, kind: SessionKind) -> SessionState {
        self.slot(kind).lock().await.state
    }

    pub async fn is_connected(&self, kind: SessionKind) -> bool {
        self.state(kind).await == SessionState::Connected
    }

    pub async fn connection_id(&self, kind: SessionKind) -> Option<ConnectionId> {
        self.slot(kind).lock().await.connection_id.clone()
    }

    /// Whether the connection id belongs to one of our own sessions.
    pub async fn is_my_own_connection(&self, connection_id: &ConnectionId) -> bool {
        for kind in [SessionKind::Webcam, SessionKind::Screen] {
            if self.slot(kind).lock().await.connection_id.as_ref() == Some(connection_id) {
                return true;
            }
        }
        false
    }

    /// True when the connected webcam identity carries a different nickname.
    pub async fn needs_nickname_signal(&self, nickname: &str) -> bool {
        let slot = self.webcam.lock().await;
        slot.metadata
            .as_ref()
            .and_then(|m| m.client_data.as_deref())
            != Some(nickname)
    }

    async fn connected_handle(&self, kind: SessionKind) -> Option<SessionHandle> {
        let slot = self.slot(kind).lock().await;
        if slot.state == SessionState::Connected {
            slot.handle.clone()
        } else {
            None
        }
    }

    // --- publishing ---

    /// Publish into the session matching `kind`.
    ///
    /// A session that is not connected or lacks publish capability is not an
    /// error: it is logged and reported as [`PublishOutcome::NotPublishable`].
    #[instrument(skip_all, name = "cc.coordinator.publish", fields(kind = %kind))]
    pub async fn publish(
        &self,
        kind: StreamKind,
        publisher: &PublisherHandle,
    ) -> Result<PublishOutcome, ClientError> {
        let session = kind.session();
        let Some(handle) = self.connected_handle(session).await else {
            error!(
                target: "cc.coordinator",
                session = %session,
                "Session not connected, cannot publish"
            );
            return Ok(PublishOutcome::NotPublishable);
        };
        if !self.transport.capabilities(&handle).publish {
            error!(
                target: "cc.coordinator",
                session = %session,
                "Session has no publish capability"
            );
            return Ok(PublishOutcome::NotPublishable);
        }

        self.transport.publish(&handle, publisher).await?;
        info!(
            target: "cc.coordinator",
            session = %session,
            publisher = %publisher,
            "Published"
        );
        Ok(PublishOutcome::Published)
    }

    /// Unpublish from the session matching `kind`. No-op without a session.
    #[instrument(skip_all, name = "cc.coordinator.unpublish", fields(kind = %kind))]
    pub async fn unpublish(
        &self,
        kind: StreamKind,
        publisher: &PublisherHandle,
    ) -> Result<(), ClientError> {
        let session = kind.session();
        let handle = self.slot(session).lock().await.handle.clone();
        let Some(handle) = handle else {
            debug!(
                target: "cc.coordinator",
                session = %session,
                "No session, nothing to unpublish"
            );
            return Ok(());
        };

        self.transport.unpublish(&handle, publisher).await?;
        info!(
            target: "cc.coordinator",
            session = %session,
            publisher = %publisher,
            "Unpublished"
        );
        Ok(())
    }

    pub async fn init_publisher(
        &self,
        properties: &PublisherProperties,
    ) -> Result<PublisherHandle, ClientError> {
        let publisher = self.transport.init_publisher(properties).await?;
        debug!(target: "cc.coordinator", publisher = %publisher, "Publisher created");
        Ok(publisher)
    }

    /// Camera publisher from the selected devices. `None` when neither a
    /// camera nor a microphone is wanted.
    pub async fn init_camera_publisher(
        &self,
        video: bool,
        audio: bool,
    ) -> Result<Option<PublisherHandle>, ClientError> {
        if !video && !audio {
            return Ok(None);
        }
        let devices = self.devices.read().await.clone();
        let properties = PublisherProperties {
            constraints: CaptureConstraints {
                video: if video {
                    devices.camera_source()
                } else {
                    CaptureSource::None
                },
                audio: if audio {
                    devices.microphone_source()
                } else {
                    CaptureSource::None
                },
            },
            publish_video: video,
            publish_audio: audio,
            mirror: true,
        };
        self.init_publisher(&properties).await.map(Some)
    }

    /// Fresh screen publisher. Audio comes from the selected microphone.
    pub async fn init_screen_publisher(
        &self,
        has_audio: bool,
    ) -> Result<PublisherHandle, ClientError> {
        if !self.context.screen_capture_supported {
            return Err(ClientError::ScreenShareUnavailable);
        }
        let devices = self.devices.read().await.clone();
        let properties = PublisherProperties {
            constraints: CaptureConstraints {
                video: CaptureSource::Screen,
                audio: devices.microphone_source(),
            },
            publish_video: true,
            publish_audio: has_audio,
            mirror: false,
        };
        self.init_publisher(&properties).await
    }

    pub async fn publish_video(
        &self,
        publisher: &PublisherHandle,
        enabled: bool,
        track: Option<MediaTrack>,
    ) -> Result<(), ClientError> {
        self.transport
            .publish_video(publisher, enabled, track)
            .await?;
        debug!(
            target: "cc.coordinator",
            publisher = %publisher,
            enabled,
            "Publisher video toggled"
        );
        Ok(())
    }

    pub fn publish_audio(&self, publisher: &PublisherHandle, enabled: bool) {
        self.transport.publish_audio(publisher, enabled);
        debug!(
            target: "cc.coordinator",
            publisher = %publisher,
            enabled,
            "Publisher audio toggled"
        );
    }

    // --- devices ---

    pub async fn set_selected_devices(&self, devices: DeviceSelection) {
        *self.devices.write().await = devices;
    }

    pub async fn selected_devices(&self) -> DeviceSelection {
        self.devices.read().await.clone()
    }

    async fn remember_devices(&self, stream: &MediaStream) {
        let mut devices = self.devices.write().await;
        if let Some(id) = stream.video.as_ref().and_then(|t| t.device_id.clone()) {
            devices.camera = Some(id);
        }
        if let Some(id) = stream.audio.as_ref().and_then(|t| t.device_id.clone()) {
            devices.microphone = Some(id);
        }
    }

    /// Acquire a capture stream.
    ///
    /// With `device_fallback_on_access_denied` set, a `DeviceAccessDenied`
    /// failure is retried exactly once with the last-known-good device
    /// (camera when camera video is requested, else microphone when audio is
    /// requested). A denied screen-only capture is not retried. Any other
    /// failure, or the retry's failure, is returned unchanged.
    #[instrument(skip_all, name = "cc.coordinator.acquire_capture")]
    pub async fn acquire_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream, ClientError> {
        let first = self.transport.acquire_capture(constraints).await;

        let stream = match first {
            Ok(stream) => stream,
            Err(CaptureError::DeviceAccessDenied(reason))
                if self.context.device_fallback_on_access_denied =>
            {
                let devices = self.devices.read().await.clone();
                let mut retry = constraints.clone();
                if constraints.video.is_requested() && constraints.video != CaptureSource::Screen {
                    retry.video = devices.camera_source();
                } else if constraints.audio.is_requested() {
                    retry.audio = devices.microphone_source();
                } else {
                    // Screen capture has no device to fall back to.
                    error!(
                        target: "cc.coordinator",
                        reason = %reason,
                        "Screen capture denied"
                    );
                    return Err(CaptureError::DeviceAccessDenied(reason).into());
                }
                warn!(
                    target: "cc.coordinator",
                    reason = %reason,
                    "Device access denied, retrying with last-known-good device"
                );

                match self.transport.acquire_capture(&retry).await {
                    Ok(stream) => {
                        metrics::record_capture_fallback("recovered");
                        stream
                    }
                    Err(e) => {
                        metrics::record_capture_fallback("failed");
                        error!(
                            target: "cc.coordinator",
                            error = %e,
                            "Capture retry failed"
                        );
                        return Err(e.into());
                    }
                }
            }
            Err(e) => {
                error!(target: "cc.coordinator", error = %e, "Capture failed");
                return Err(e.into());
            }
        };

        self.remember_devices(&stream).await;
        Ok(stream)
    }

    /// Capture fresh media and swap it into an existing publisher.
    ///
    /// Video is preferred over audio when both are requested. The screen
    /// always takes a new screen capture.
    #[instrument(skip_all, name = "cc.coordinator.replace_track", fields(kind = %kind))]
    pub async fn replace_track(
        &self,
        kind: StreamKind,
        publisher: &PublisherHandle,
        constraints: &CaptureConstraints,
    ) -> Result<(), ClientError> {
        let request = match kind {
            StreamKind::Screen => CaptureConstraints::video_only(CaptureSource::Screen),
            StreamKind::Camera if constraints.video.is_requested() => {
                CaptureConstraints::video_only(constraints.video.clone())
            }
            StreamKind::Camera if constraints.audio.is_requested() => {
                CaptureConstraints::audio_only(constraints.audio.clone())
            }
            StreamKind::Camera => {
                debug!(target: "cc.coordinator", "No track requested, nothing to replace");
                return Ok(());
            }
        };

        let stream = self.acquire_capture(&request).await?;
        let track = if request.video.is_requested() {
            stream.video
        } else {
            stream.audio
        };
        let Some(track) = track else {
            return Err(ClientError::Capture(CaptureError::Other(
                "capture returned no matching track".to_string(),
            )));
        };

        self.transport.replace_track(publisher, track).await?;
        info!(
            target: "cc.coordinator",
            kind = %kind,
            publisher = %publisher,
            "Track replaced"
        );
        Ok(())
    }

    // --- inbound streams and signals ---

    /// Subscribe to a remote stream through the session it was published in.
    pub async fn subscribe(
        &self,
        session: SessionKind,
        stream_id: &StreamId,
    ) -> Result<SubscriberHandle, ClientError> {
        let handle = self
            .connected_handle(session)
            .await
            .ok_or(ClientError::SessionUnavailable(session))?;
        Ok(self.transport.subscribe(&handle, stream_id).await?)
    }

    pub async fn subscribe_to_transcription(
        &self,
        subscriber: &SubscriberHandle,
        lang: &str,
    ) -> Result<(), ClientError> {
        let handle = self
            .connected_handle(SessionKind::Webcam)
            .await
            .ok_or(ClientError::SessionUnavailable(SessionKind::Webcam))?;
        Ok(self
            .transport
            .subscribe_to_transcription(&handle, subscriber, lang)
            .await?)
    }

    pub async fn unsubscribe_from_transcription(
        &self,
        subscriber: &SubscriberHandle,
    ) -> Result<(), ClientError> {
        let handle = self
            .connected_handle(SessionKind::Webcam)
            .await
            .ok_or(ClientError::SessionUnavailable(SessionKind::Webcam))?;
        Ok(self
            .transport
            .unsubscribe_from_transcription(&handle, subscriber)
            .await?)
    }

    /// Send a signal over the webcam session.
    pub async fn send_signal(
        &self,
        kind: SignalType,
        data: String,
        to: Vec<ConnectionId>,
    ) -> Result<(), ClientError> {
        let handle = self
            .connected_handle(SessionKind::Webcam)
            .await
            .ok_or(ClientError::SessionUnavailable(SessionKind::Webcam))?;
        let signal = OutboundSignal { kind, to, data };
        self.transport.signal(&handle, &signal).await?;
        debug!(
            target: "cc.coordinator",
            signal = signal.kind.as_str(),
            recipients = signal.to.len(),
            "Signal sent"
        );
        Ok(())
    }

    #[must_use]
    pub fn subscribe_connection_lost(&self) -> watch::Receiver<bool> {
        self.connection_lost.subscribe()
    }

    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        *self.connection_lost.borrow()
    }

    pub(crate) fn set_connection_lost(&self, lost: bool) {
        self.connection_lost.send_replace(lost);
    }

    #[must_use]
    pub fn subscribe_signals(&self) -> broadcast::Receiver<ReceivedSignal> {
        self.signals.subscribe()
    }

    pub(crate) fn broadcast_signal(&self, signal: ReceivedSignal) {
        // No receivers is fine
        let _ = self.signals.send(signal);
    }
}
