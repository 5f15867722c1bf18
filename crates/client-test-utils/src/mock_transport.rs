//! Mock media transport.
//!
//! Ids are deterministic so tests can predict them:
//!
//! | Handle | Format |
//! |--------|--------|
//! | session | `session-{kind}` |
//! | connection | `con-{kind}-{n}` (n counts connects per session kind) |
//! | publisher | `pub-{n}` |
//! | subscriber | `sub-{stream_id}` |
//!
//! # Example
//!
//! ```rust,ignore
//! use client_test_utils::MockTransport;
//!
//! let transport = MockTransport::builder()
//!     .fail_connect(SessionKind::Webcam)
//!     .capture_result(Err(CaptureError::DeviceAccessDenied("nope".into())))
//!     .build();
//! ```

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{ConnectionId, SessionKind};
use conference_client::transport::{
    CaptureConstraints, CaptureError, CaptureSource, MediaStream, MediaTrack, MediaTransport,
    OutboundSignal, PublisherHandle, PublisherProperties, SessionCapabilities, SessionHandle,
    StreamId, SubscriberHandle, TrackKind, TransportError,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateSession(SessionKind),
    Connect {
        session: SessionKind,
        metadata: String,
    },
    Disconnect(SessionKind),
    InitPublisher(PublisherProperties),
    Publish {
        session: SessionKind,
        publisher: PublisherHandle,
    },
    Unpublish {
        session: SessionKind,
        publisher: PublisherHandle,
    },
    PublishVideo {
        publisher: PublisherHandle,
        enabled: bool,
    },
    PublishAudio {
        publisher: PublisherHandle,
        enabled: bool,
    },
    AcquireCapture(CaptureConstraints),
    ReplaceTrack {
        publisher: PublisherHandle,
        track: MediaTrack,
    },
    Subscribe(StreamId),
    SubscribeTranscription(SubscriberHandle),
    UnsubscribeTranscription(SubscriberHandle),
    Signal(OutboundSignal),
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<TransportCall>,
    fail_connect: HashSet<SessionKind>,
    deny_publish: HashSet<SessionKind>,
    fail_publish: HashSet<SessionKind>,
    fail_unpublish: HashSet<SessionKind>,
    fail_publish_video: bool,
    fail_init_publisher: bool,
    capture_results: VecDeque<Result<MediaStream, CaptureError>>,
    failing_transcriptions: HashSet<SubscriberHandle>,
    webcam_connects: usize,
    screen_connects: usize,
    publishers: usize,
    tracks: usize,
}

/// In-memory [`MediaTransport`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    #[must_use]
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    #[must_use]
    pub fn connect_count(&self, session: SessionKind) -> usize {
        self.count(|c| matches!(c, TransportCall::Connect { session: s, .. } if *s == session))
    }

    #[must_use]
    pub fn publish_count(&self, session: SessionKind) -> usize {
        self.count(|c| matches!(c, TransportCall::Publish { session: s, .. } if *s == session))
    }

    #[must_use]
    pub fn unpublish_count(&self, session: SessionKind) -> usize {
        self.count(|c| matches!(c, TransportCall::Unpublish { session: s, .. } if *s == session))
    }

    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.count(|c| matches!(c, TransportCall::AcquireCapture(_)))
    }

    /// Transcription subscription attempts, successful or not.
    #[must_use]
    pub fn transcription_attempts(&self) -> Vec<SubscriberHandle> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::SubscribeTranscription(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn signals(&self) -> Vec<OutboundSignal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Signal(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// Metadata sent with the last connect of `session`.
    #[must_use]
    pub fn last_connect_metadata(&self, session: SessionKind) -> Option<String> {
        self.calls().into_iter().rev().find_map(|c| match c {
            TransportCall::Connect {
                session: s,
                metadata,
            } if s == session => Some(metadata),
            _ => None,
        })
    }

    /// Forget recorded calls, keep behavior.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn set_fail_connect(&self, session: SessionKind, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.fail_connect.insert(session);
        } else {
            inner.fail_connect.remove(&session);
        }
    }

    pub fn set_fail_publish(&self, session: SessionKind, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.fail_publish.insert(session);
        } else {
            inner.fail_publish.remove(&session);
        }
    }

    pub fn set_fail_unpublish(&self, session: SessionKind, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fail {
            inner.fail_unpublish.insert(session);
        } else {
            inner.fail_unpublish.remove(&session);
        }
    }

    pub fn set_fail_publish_video(&self, fail: bool) {
        self.inner.lock().unwrap().fail_publish_video = fail;
    }

    pub fn push_capture_result(&self, result: Result<MediaStream, CaptureError>) {
        self.inner.lock().unwrap().capture_results.push_back(result);
    }

    pub fn fail_transcription_for(&self, subscriber: SubscriberHandle) {
        self.inner
            .lock()
            .unwrap()
            .failing_transcriptions
            .insert(subscriber);
    }

    pub fn clear_transcription_failures(&self) {
        self.inner.lock().unwrap().failing_transcriptions.clear();
    }

    fn record(&self, call: TransportCall) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn synthesize_track(inner: &mut Inner, kind: TrackKind, source: &CaptureSource) -> MediaTrack {
        inner.tracks += 1;
        let device_id = match source {
            CaptureSource::Device(id) => Some(id.clone()),
            CaptureSource::Default => Some(match kind {
                TrackKind::Video => "default-camera".to_string(),
                TrackKind::Audio => "default-microphone".to_string(),
            }),
            CaptureSource::Screen | CaptureSource::None => None,
        };
        MediaTrack {
            id: format!("track-{}", inner.tracks),
            kind,
            device_id,
        }
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn create_session(&self, kind: SessionKind) -> Result<SessionHandle, TransportError> {
        self.record(TransportCall::CreateSession(kind));
        Ok(SessionHandle::new(format!("session-{}", kind.as_str()), kind))
    }

    async fn connect(
        &self,
        session: &SessionHandle,
        _token: &SecretString,
        metadata: &str,
    ) -> Result<ConnectionId, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(TransportCall::Connect {
            session: session.kind(),
            metadata: metadata.to_string(),
        });
        if inner.fail_connect.contains(&session.kind()) {
            return Err(TransportError::Rejected("connect refused".to_string()));
        }
        let n = match session.kind() {
            SessionKind::Webcam => {
                inner.webcam_connects += 1;
                inner.webcam_connects
            }
            SessionKind::Screen => {
                inner.screen_connects += 1;
                inner.screen_connects
            }
        };
        Ok(ConnectionId::new(format!(
            "con-{}-{n}",
            session.kind().as_str()
        )))
    }

    async fn disconnect(&self, session: &SessionHandle) {
        self.record(TransportCall::Disconnect(session.kind()));
    }

    fn capabilities(&self, session: &SessionHandle) -> SessionCapabilities {
        let denied = self
            .inner
            .lock()
            .unwrap()
            .deny_publish
            .contains(&session.kind());
        SessionCapabilities {
            publish: !denied,
            subscribe: true,
        }
    }

    async fn init_publisher(
        &self,
        properties: &PublisherProperties,
    ) -> Result<PublisherHandle, CaptureError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(TransportCall::InitPublisher(properties.clone()));
        if inner.fail_init_publisher {
            return Err(CaptureError::Other("publisher init failed".to_string()));
        }
        inner.publishers += 1;
        Ok(PublisherHandle::new(format!("pub-{}", inner.publishers)))
    }

    async fn publish(
        &self,
        session: &SessionHandle,
        publisher: &PublisherHandle,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(TransportCall::Publish {
            session: session.kind(),
            publisher: publisher.clone(),
        });
        if inner.fail_publish.contains(&session.kind()) {
            return Err(TransportError::Failed("publish failed".to_string()));
        }
        Ok(())
    }

    async fn unpublish(
        &self,
        session: &SessionHandle,
        publisher: &PublisherHandle,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(TransportCall::Unpublish {
            session: session.kind(),
            publisher: publisher.clone(),
        });
        if inner.fail_unpublish.contains(&session.kind()) {
            return Err(TransportError::Failed("unpublish failed".to_string()));
        }
        Ok(())
    }

    async fn publish_video(
        &self,
        publisher: &PublisherHandle,
        enabled: bool,
        _track: Option<MediaTrack>,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(TransportCall::PublishVideo {
            publisher: publisher.clone(),
            enabled,
        });
        if inner.fail_publish_video {
            return Err(TransportError::Failed("video toggle failed".to_string()));
        }
        Ok(())
    }

    fn publish_audio(&self, publisher: &PublisherHandle, enabled: bool) {
        self.record(TransportCall::PublishAudio {
            publisher: publisher.clone(),
            enabled,
        });
    }

    async fn acquire_capture(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream, CaptureError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(TransportCall::AcquireCapture(constraints.clone()));
        if let Some(result) = inner.capture_results.pop_front() {
            return result;
        }
        let video = constraints
            .video
            .is_requested()
            .then(|| Self::synthesize_track(&mut inner, TrackKind::Video, &constraints.video));
        let audio = constraints
            .audio
            .is_requested()
            .then(|| Self::synthesize_track(&mut inner, TrackKind::Audio, &constraints.audio));
        Ok(MediaStream { video, audio })
    }

    async fn replace_track(
        &self,
        publisher: &PublisherHandle,
        track: MediaTrack,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::ReplaceTrack {
            publisher: publisher.clone(),
            track,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        _session: &SessionHandle,
        stream_id: &StreamId,
    ) -> Result<SubscriberHandle, TransportError> {
        self.record(TransportCall::Subscribe(stream_id.clone()));
        Ok(SubscriberHandle::new(format!("sub-{stream_id}")))
    }

    async fn subscribe_to_transcription(
        &self,
        _session: &SessionHandle,
        subscriber: &SubscriberHandle,
        _lang: &str,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(TransportCall::SubscribeTranscription(subscriber.clone()));
        if inner.failing_transcriptions.contains(subscriber) {
            return Err(TransportError::Failed(
                "transcription unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn unsubscribe_from_transcription(
        &self,
        _session: &SessionHandle,
        subscriber: &SubscriberHandle,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::UnsubscribeTranscription(subscriber.clone()));
        Ok(())
    }

    async fn signal(
        &self,
        _session: &SessionHandle,
        signal: &OutboundSignal,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::Signal(signal.clone()));
        Ok(())
    }
}

/// Builder for [`MockTransport`] behavior.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    inner: Inner,
}

impl MockTransportBuilder {
    /// Reject every connect of `session`.
    #[must_use]
    pub fn fail_connect(mut self, session: SessionKind) -> Self {
        self.inner.fail_connect.insert(session);
        self
    }

    /// Report no publish capability for `session`.
    #[must_use]
    pub fn deny_publish(mut self, session: SessionKind) -> Self {
        self.inner.deny_publish.insert(session);
        self
    }

    /// Fail every publish into `session`.
    #[must_use]
    pub fn fail_publish(mut self, session: SessionKind) -> Self {
        self.inner.fail_publish.insert(session);
        self
    }

    /// Fail every unpublish from `session`.
    #[must_use]
    pub fn fail_unpublish(mut self, session: SessionKind) -> Self {
        self.inner.fail_unpublish.insert(session);
        self
    }

    /// Fail every video enable/disable.
    #[must_use]
    pub fn fail_publish_video(mut self) -> Self {
        self.inner.fail_publish_video = true;
        self
    }

    #[must_use]
    pub fn fail_init_publisher(mut self) -> Self {
        self.inner.fail_init_publisher = true;
        self
    }

    /// Queue a capture result. Queued results are returned in order before
    /// falling back to synthesized tracks.
    #[must_use]
    pub fn capture_result(mut self, result: Result<MediaStream, CaptureError>) -> Self {
        self.inner.capture_results.push_back(result);
        self
    }

    /// Fail transcription subscription for `subscriber`.
    #[must_use]
    pub fn fail_transcription(mut self, subscriber: impl Into<String>) -> Self {
        self.inner
            .failing_transcriptions
            .insert(SubscriberHandle::new(subscriber));
        self
    }

    #[must_use]
    pub fn build(self) -> MockTransport {
        MockTransport {
            inner: Arc::new(Mutex::new(self.inner)),
        }
    }
}
