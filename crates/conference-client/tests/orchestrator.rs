//! Integration tests for the action orchestrator.
//!
//! Camera, microphone and screen-share transitions across the two sessions,
//! checked through local snapshots and the mock transport's call log.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use client_test_utils::{
    stream_created, ClientHarness, MockTransport, TestJoin, TransportCall,
};
use common::secret::SecretString;
use common::types::{ConnectionId, SessionKind, StreamKind};
use conference_client::coordinator::{ExecutionContext, SessionState};
use conference_client::errors::ClientError;
use conference_client::metadata::NicknamePayload;
use conference_client::snapshot::ParticipantSnapshot;
use conference_client::transport::{
    CaptureConstraints, CaptureSource, PublisherHandle, SignalType,
};

async fn joined() -> ClientHarness {
    ClientHarness::joined(MockTransport::new(), "me", "Ada").await
}

async fn joined_with(transport: MockTransport, join: TestJoin) -> ClientHarness {
    let h = ClientHarness::new(transport);
    h.orchestrator.join(join.build()).await.unwrap();
    h
}

fn assert_single_live_audio(local: &ParticipantSnapshot) {
    let live = local.streams.iter().filter(|s| s.carries_live_audio()).count();
    assert!(live <= 1, "camera and screen both carry live audio: {local:?}");
}

fn screen_publishers(transport: &MockTransport) -> usize {
    transport.count(|c| {
        matches!(c, TransportCall::InitPublisher(p) if p.constraints.video == CaptureSource::Screen)
    })
}

// ============================================================================
// Join / leave
// ============================================================================

#[tokio::test]
async fn test_join_resolves_rendezvous_id_and_publishes() {
    let h = joined().await;

    let local = h.local();
    assert!(local.is_local);
    assert_eq!(local.nickname, "Ada");
    let camera = local.stream(StreamKind::Camera).unwrap();
    assert_eq!(camera.connection_id, ConnectionId::new("con-webcam-1"));
    assert!(camera.video_enabled);
    assert!(camera.audio_enabled);
    assert!(!camera.enlarged);
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 1);
    assert_eq!(
        h.coordinator.state(SessionKind::Webcam).await,
        SessionState::Connected
    );
    // The screen session exists but stays idle until a share starts.
    assert_eq!(h.transport.connect_count(SessionKind::Screen), 0);
}

#[tokio::test]
async fn test_join_twice_is_a_conflict() {
    let h = joined().await;

    let err = h
        .orchestrator
        .join(TestJoin::new("me", "Ada").build())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Conflict(_)));
}

#[tokio::test]
async fn test_join_without_publish_capability_still_joins() {
    let transport = MockTransport::builder()
        .deny_publish(SessionKind::Webcam)
        .build();
    let h = joined_with(transport, TestJoin::new("me", "Ada")).await;

    assert!(h.local().is_camera_active());
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 0);
}

#[tokio::test]
async fn test_leave_clears_everything() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    h.orchestrator.leave().await;

    assert!(h.directory.local_snapshot().is_none());
    assert!(h.directory.remote_snapshots().is_empty());
    assert_eq!(
        h.coordinator.state(SessionKind::Webcam).await,
        SessionState::Disconnected
    );
}

// ============================================================================
// Camera video
// ============================================================================

#[tokio::test]
async fn test_camera_only_video_off_is_pure_mute() {
    let h = joined().await;
    h.transport.clear_calls();

    h.orchestrator.publish_video(false).await.unwrap();

    let camera = h.local().stream(StreamKind::Camera).unwrap().clone();
    assert!(!camera.video_enabled);
    assert!(camera.connected);
    assert!(camera.audio_enabled);
    assert_eq!(h.transport.unpublish_count(SessionKind::Webcam), 0);
    assert_eq!(h.transport.connect_count(SessionKind::Webcam), 0);
    assert_eq!(
        h.transport.calls(),
        vec![TransportCall::PublishVideo {
            publisher: PublisherHandle::new("pub-1"),
            enabled: false,
        }]
    );
}

#[tokio::test]
async fn test_camera_on_off_restores_identical_flags() {
    let h = joined().await;
    let before = h.local();

    h.orchestrator.publish_video(false).await.unwrap();
    h.orchestrator.publish_video(true).await.unwrap();

    assert_eq!(h.local(), before);
    // Turning video back on captures a fresh track.
    assert_eq!(h.transport.capture_count(), 1);
}

#[tokio::test]
async fn test_video_off_with_screen_unpublishes_camera() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    assert!(h.orchestrator.have_i_camera_and_screen_active());
    let audio_before = h.local().has_audio_active();

    h.orchestrator.publish_video(false).await.unwrap();

    let local = h.local();
    assert!(!local.is_camera_active());
    assert!(local.is_screen_active());
    assert_eq!(h.transport.unpublish_count(SessionKind::Webcam), 1);
    let camera = local.stream(StreamKind::Camera).unwrap();
    assert!(!camera.audio_enabled);
    assert!(!camera.video_enabled);
    assert_eq!(
        local.stream(StreamKind::Screen).unwrap().audio_enabled,
        audio_before
    );
    assert_single_live_audio(&local);
}

#[tokio::test]
async fn test_video_on_with_only_screen_restores_camera() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.orchestrator.publish_video(false).await.unwrap();
    assert!(h.orchestrator.is_only_my_screen_active());
    let captures_before = h.transport.capture_count();

    h.orchestrator.publish_video(true).await.unwrap();

    let local = h.local();
    assert!(local.is_camera_active());
    assert!(local.is_screen_active());
    let camera = local.stream(StreamKind::Camera).unwrap();
    assert!(camera.video_enabled);
    assert!(camera.audio_enabled);
    assert!(!local.stream(StreamKind::Screen).unwrap().audio_enabled);
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 2);
    // Webcam session was already connected.
    assert_eq!(h.transport.connect_count(SessionKind::Webcam), 1);
    assert_eq!(h.transport.capture_count(), captures_before + 1);
    assert_single_live_audio(&local);
}

#[tokio::test]
async fn test_video_off_with_only_screen_is_a_noop() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.orchestrator.publish_video(false).await.unwrap();
    let before = h.local();
    h.transport.clear_calls();

    h.orchestrator.publish_video(false).await.unwrap();

    assert_eq!(h.local(), before);
    assert!(h.transport.calls().is_empty());
}

// ============================================================================
// Microphone
// ============================================================================

#[tokio::test]
async fn test_audio_targets_camera_when_active() {
    let h = joined().await;

    h.orchestrator.publish_audio(false).await.unwrap();
    assert!(!h.orchestrator.is_my_audio_active());

    h.orchestrator.publish_audio(true).await.unwrap();
    assert!(h.local().carries_live_audio(StreamKind::Camera));
}

#[tokio::test]
async fn test_audio_targets_screen_when_camera_off() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.orchestrator.publish_video(false).await.unwrap();

    h.orchestrator.publish_audio(false).await.unwrap();
    assert!(!h.local().stream(StreamKind::Screen).unwrap().audio_enabled);

    h.orchestrator.publish_audio(true).await.unwrap();
    let local = h.local();
    assert!(local.carries_live_audio(StreamKind::Screen));
    assert_single_live_audio(&local);
}

// ============================================================================
// Screen share
// ============================================================================

#[tokio::test]
async fn test_start_screenshare_adds_enlarged_screen() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;
    h.directory.toggle_enlarged(&"c-bob".into()).await;

    h.orchestrator.toggle_screenshare().await.unwrap();

    let local = h.local();
    let screen = local.stream(StreamKind::Screen).unwrap();
    assert_eq!(screen.connection_id, ConnectionId::new("con-screen-1"));
    assert!(screen.enlarged);
    assert!(screen.video_enabled);
    // Camera video was on, so the camera keeps the microphone.
    assert!(!screen.audio_enabled);
    assert!(local.carries_live_audio(StreamKind::Camera));
    assert!(!h.remote("bob").stream(StreamKind::Camera).unwrap().enlarged);
    assert_eq!(h.transport.publish_count(SessionKind::Screen), 1);
    assert!(
        h.coordinator
            .is_my_own_connection(&"con-screen-1".into())
            .await
    );
}

#[tokio::test]
async fn test_start_screenshare_with_camera_video_off_moves_audio() {
    let transport = MockTransport::new();
    let h = joined_with(transport, TestJoin::new("me", "Ada").with_video(false)).await;

    h.orchestrator.toggle_screenshare().await.unwrap();

    let local = h.local();
    assert!(!local.is_camera_active());
    assert!(local.carries_live_audio(StreamKind::Screen));
    assert_eq!(h.transport.unpublish_count(SessionKind::Webcam), 1);
    assert_single_live_audio(&local);
}

#[tokio::test]
async fn test_stop_screenshare_keeps_camera_audio() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();

    h.orchestrator.toggle_screenshare().await.unwrap();

    let local = h.local();
    assert!(local.stream(StreamKind::Screen).is_none());
    assert!(local.is_camera_active());
    assert!(local.carries_live_audio(StreamKind::Camera));
    assert_eq!(h.transport.unpublish_count(SessionKind::Screen), 1);
}

#[tokio::test]
async fn test_toggle_with_only_screen_swaps_back_to_camera() {
    let transport = MockTransport::new();
    let h = joined_with(transport, TestJoin::new("me", "Ada").with_video(false)).await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    assert!(h.orchestrator.is_only_my_screen_active());

    h.orchestrator.toggle_screenshare().await.unwrap();

    let local = h.local();
    assert!(local.is_camera_active());
    assert!(!local.is_screen_active());
    assert!(local.carries_live_audio(StreamKind::Camera));
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 2);
    assert_eq!(h.transport.unpublish_count(SessionKind::Screen), 1);
}

#[tokio::test]
async fn test_every_share_uses_a_fresh_publisher() {
    let h = joined().await;

    h.orchestrator.toggle_screenshare().await.unwrap();
    let first = h.local().publisher(StreamKind::Screen).cloned().unwrap();
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.orchestrator.toggle_screenshare().await.unwrap();
    let second = h.local().publisher(StreamKind::Screen).cloned().unwrap();

    assert_ne!(first, second);
    assert_eq!(screen_publishers(&h.transport), 2);
    // The screen session stays connected between shares.
    assert_eq!(h.transport.connect_count(SessionKind::Screen), 1);
}

#[tokio::test]
async fn test_screenshare_unavailable_without_screen_capture() {
    let h = ClientHarness::with_context(
        MockTransport::new(),
        ExecutionContext {
            screen_capture_supported: false,
            device_fallback_on_access_denied: false,
        },
    );
    h.orchestrator
        .join(TestJoin::new("me", "Ada").build())
        .await
        .unwrap();

    let err = h.orchestrator.toggle_screenshare().await.unwrap_err();

    assert!(matches!(err, ClientError::ScreenShareUnavailable));
    assert!(err.is_recoverable());
    assert_eq!(screen_publishers(&h.transport), 0);
    assert!(!h.orchestrator.is_my_screen_active());
}

#[tokio::test]
async fn test_screen_not_publishable_rolls_back() {
    let transport = MockTransport::builder()
        .deny_publish(SessionKind::Screen)
        .build();
    let h = joined_with(transport, TestJoin::new("me", "Ada")).await;

    let err = h.orchestrator.toggle_screenshare().await.unwrap_err();

    assert!(matches!(err, ClientError::NotPublishable(SessionKind::Screen)));
    assert!(!h.orchestrator.is_my_screen_active());
    assert!(h.local().stream(StreamKind::Screen).is_none());
}

#[tokio::test]
async fn test_screen_track_ended() {
    let h = joined().await;
    h.transport.clear_calls();

    // Nothing shared: no-op.
    h.orchestrator.on_screen_track_ended().await.unwrap();
    assert!(h.transport.calls().is_empty());

    h.orchestrator.toggle_screenshare().await.unwrap();
    h.orchestrator.on_screen_track_ended().await.unwrap();
    assert!(!h.orchestrator.is_my_screen_active());
}

#[tokio::test]
async fn test_single_live_audio_across_transitions() {
    let transport = MockTransport::new();
    let h = joined_with(transport, TestJoin::new("me", "Ada").with_video(false)).await;

    h.orchestrator.toggle_screenshare().await.unwrap();
    assert_single_live_audio(&h.local());
    h.orchestrator.publish_video(true).await.unwrap();
    assert_single_live_audio(&h.local());
    h.orchestrator.publish_audio(true).await.unwrap();
    assert_single_live_audio(&h.local());
    h.orchestrator.publish_video(false).await.unwrap();
    assert_single_live_audio(&h.local());
    h.orchestrator.toggle_screenshare().await.unwrap();
    assert_single_live_audio(&h.local());
}

// ============================================================================
// Transport failures
// ============================================================================

/// Joined with camera video off, then shared the screen: only the screen is
/// active and it carries the microphone.
async fn only_screen(transport: MockTransport) -> ClientHarness {
    let h = joined_with(transport, TestJoin::new("me", "Ada").with_video(false)).await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    assert!(h.orchestrator.is_only_my_screen_active());
    h
}

fn assert_camera_stays_off(local: &ParticipantSnapshot) {
    assert!(!local.is_camera_active());
    assert!(!local.stream(StreamKind::Camera).unwrap().video_enabled);
    assert!(local.carries_live_audio(StreamKind::Screen));
    assert_single_live_audio(local);
}

#[tokio::test]
async fn test_video_on_with_failed_webcam_connect_keeps_camera_off() {
    let h = only_screen(MockTransport::new()).await;
    h.coordinator.disconnect(SessionKind::Webcam).await;
    h.coordinator.initialize().await.unwrap();
    h.coordinator
        .set_token(SessionKind::Webcam, SecretString::from("webcam-token-2"))
        .await
        .unwrap();
    h.transport.set_fail_connect(SessionKind::Webcam, true);
    h.transport.clear_calls();

    let err = h.orchestrator.publish_video(true).await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert_camera_stays_off(&h.local());
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 0);
    assert_eq!(h.transport.capture_count(), 0);
    assert_eq!(
        h.coordinator.state(SessionKind::Webcam).await,
        SessionState::Uninitialized
    );
}

#[tokio::test]
async fn test_video_on_with_failed_camera_publish_keeps_camera_off() {
    let h = only_screen(MockTransport::new()).await;
    h.transport.set_fail_publish(SessionKind::Webcam, true);
    h.transport.clear_calls();

    let err = h.orchestrator.publish_video(true).await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert_camera_stays_off(&h.local());
    assert_eq!(h.transport.capture_count(), 0);
    assert_eq!(
        h.transport
            .count(|c| matches!(c, TransportCall::PublishAudio { .. })),
        0
    );
}

#[tokio::test]
async fn test_video_on_with_failed_video_enable_unpublishes_camera() {
    let h = only_screen(MockTransport::new()).await;
    h.transport.set_fail_publish_video(true);
    h.transport.clear_calls();

    let err = h.orchestrator.publish_video(true).await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert_camera_stays_off(&h.local());
    assert_eq!(h.transport.publish_count(SessionKind::Webcam), 1);
    // The camera published for this attempt is taken back down.
    assert_eq!(h.transport.unpublish_count(SessionKind::Webcam), 1);
}

#[tokio::test]
async fn test_start_screenshare_with_failed_camera_unpublish_keeps_screen_audio() {
    let transport = MockTransport::builder()
        .fail_unpublish(SessionKind::Webcam)
        .build();
    let h = joined_with(transport, TestJoin::new("me", "Ada").with_video(false)).await;

    let err = h.orchestrator.toggle_screenshare().await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    let local = h.local();
    // The screen went live with the microphone before the camera step failed.
    assert!(local.is_screen_active());
    assert!(local.carries_live_audio(StreamKind::Screen));
    assert!(!local.carries_live_audio(StreamKind::Camera));
    // The camera is still published, so it stays active.
    assert!(local.is_camera_active());
    assert_single_live_audio(&local);
}

#[tokio::test]
async fn test_stop_screenshare_with_failed_unpublish_keeps_screen() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.transport.set_fail_unpublish(SessionKind::Screen, true);

    let err = h.orchestrator.toggle_screenshare().await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert!(h.orchestrator.have_i_camera_and_screen_active());
    assert!(h.local().stream(StreamKind::Screen).unwrap().enlarged);
}

#[tokio::test]
async fn test_video_off_with_failed_camera_unpublish_keeps_camera() {
    let h = joined().await;
    h.orchestrator.toggle_screenshare().await.unwrap();
    h.transport.set_fail_unpublish(SessionKind::Webcam, true);

    let err = h.orchestrator.publish_video(false).await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    let local = h.local();
    assert!(local.is_camera_active());
    assert!(!local.stream(StreamKind::Camera).unwrap().video_enabled);
    assert!(local.carries_live_audio(StreamKind::Camera));
    assert_single_live_audio(&local);
}

// ============================================================================
// Track replacement and nickname
// ============================================================================

#[tokio::test]
async fn test_replace_camera_track() {
    let h = joined().await;

    h.orchestrator
        .replace_track(
            StreamKind::Camera,
            CaptureConstraints::video_only(CaptureSource::Device("cam-2".into())),
        )
        .await
        .unwrap();

    assert_eq!(
        h.transport
            .count(|c| matches!(c, TransportCall::ReplaceTrack { .. })),
        1
    );
    assert_eq!(
        h.coordinator.selected_devices().await.camera,
        Some("cam-2".to_string())
    );
}

#[tokio::test]
async fn test_replace_track_without_publisher() {
    let h = joined().await;

    let err = h
        .orchestrator
        .replace_track(StreamKind::Screen, CaptureConstraints::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::PublisherMissing(StreamKind::Screen)));
}

#[tokio::test]
async fn test_nickname_change_is_signalled() {
    let h = joined().await;

    h.orchestrator.set_nickname("Ada").await.unwrap();
    assert!(h.transport.signals().is_empty());

    h.orchestrator.set_nickname("  Grace ").await.unwrap();

    assert_eq!(h.local().nickname, "Grace");
    let signals = h.transport.signals();
    assert_eq!(signals.len(), 1);
    let signal = signals.first().unwrap();
    assert_eq!(signal.kind, SignalType::NicknameChanged);
    assert!(signal.to.is_empty());
    assert_eq!(NicknamePayload::parse(&signal.data), Some("Grace".to_string()));
}

#[tokio::test]
async fn test_blank_nickname_is_ignored() {
    let h = joined().await;

    h.orchestrator.set_nickname("   ").await.unwrap();

    assert_eq!(h.local().nickname, "Ada");
    assert!(h.transport.signals().is_empty());
}

#[tokio::test]
async fn test_actions_before_join_fail() {
    let h = ClientHarness::new(MockTransport::new());

    assert!(matches!(
        h.orchestrator.publish_video(true).await,
        Err(ClientError::NotInitialized)
    ));
    assert!(matches!(
        h.orchestrator.toggle_screenshare().await,
        Err(ClientError::NotInitialized)
    ));
    assert!(matches!(
        h.orchestrator.set_nickname("Ada").await,
        Err(ClientError::NotInitialized)
    ));
}
