//! Integration tests for the session event loop.
//!
//! Remote streams appearing and disappearing, metadata handling, signals and
//! reconnection, all fed through `SessionEvents::dispatch` or the spawned loop.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use client_test_utils::{
    connection_destroyed, force_mute_signal, nickname_signal, stream_created, stream_created_raw,
    subscriber_for, ClientHarness, MockTransport, TransportCall,
};
use common::types::{ConnectionId, SessionKind, StreamKind};
use conference_client::events::SessionEvents;
use conference_client::transport::{
    MediaHandle, ReceivedSignal, SignalType, StreamProperty, TransportEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn joined() -> ClientHarness {
    ClientHarness::joined(MockTransport::new(), "me", "Ada").await
}

// ============================================================================
// Stream lifecycle
// ============================================================================

#[tokio::test]
async fn test_stream_created_adds_remote_participant() {
    let h = joined().await;

    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    let bob = h.remote("bob");
    assert_eq!(bob.nickname, "Bob");
    assert!(!bob.is_local);
    let camera = bob.stream(StreamKind::Camera).unwrap();
    assert_eq!(camera.connection_id, ConnectionId::new("c-bob"));
    assert!(camera.connected);
    assert!(!camera.enlarged);
    assert_eq!(camera.handle, MediaHandle::Subscriber(subscriber_for("c-bob")));
}

#[tokio::test]
async fn test_own_stream_is_ignored() {
    let h = joined().await;

    h.dispatch(stream_created(SessionKind::Webcam, "con-webcam-1", "me", "Ada"))
        .await;

    assert!(h.directory.remote_snapshots().is_empty());
    assert_eq!(
        h.transport
            .count(|c| matches!(c, TransportCall::Subscribe(_))),
        0
    );
}

#[tokio::test]
async fn test_malformed_metadata_falls_back_to_defaults() {
    let h = joined().await;

    h.dispatch(stream_created_raw(SessionKind::Webcam, "c-anon", "not json"))
        .await;

    // No participant hint: keyed by the connection id.
    let anon = h.remote("c-anon");
    assert_eq!(anon.nickname, "Participant");
    assert!(anon.is_camera_active());
}

#[tokio::test]
async fn test_server_data_suffix_is_ignored() {
    let h = joined().await;
    let data = r#"{"version":1,"type":"CAMERA","participantId":"eve","clientData":"Eve"}%/%{"server":"x"}"#;

    h.dispatch(stream_created_raw(SessionKind::Webcam, "c-eve", data))
        .await;

    assert_eq!(h.remote("eve").nickname, "Eve");
}

#[tokio::test]
async fn test_screen_joins_existing_participant_enlarged() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-p1", "P1", "Bob"))
        .await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-p2", "P2", "Cy"))
        .await;
    assert!(h.directory.toggle_enlarged(&ConnectionId::new("c-p2")).await);

    h.dispatch(stream_created(SessionKind::Screen, "c-p1-screen", "P1", "Bob"))
        .await;

    let p1 = h.remote("P1");
    assert_eq!(p1.streams.len(), 2);
    assert_eq!(p1.nickname, "Bob");
    assert!(p1.stream(StreamKind::Screen).unwrap().enlarged);
    assert!(!p1.stream(StreamKind::Camera).unwrap().enlarged);
    assert!(!h.remote("P2").stream(StreamKind::Camera).unwrap().enlarged);
    assert_eq!(h.directory.remote_snapshots().len(), 2);
    assert!(h.directory.someone_is_sharing_screen().await);
}

#[tokio::test]
async fn test_lowercase_screen_metadata_adds_screen_connection() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-p1", "P1", "Bob"))
        .await;

    h.dispatch(stream_created_raw(
        SessionKind::Screen,
        "c-p1-screen",
        r#"{"type": "screen", "participantId": "P1"}"#,
    ))
    .await;

    let p1 = h.remote("P1");
    assert_eq!(p1.streams.len(), 2);
    let camera = p1.stream(StreamKind::Camera).unwrap();
    assert_eq!(camera.connection_id, ConnectionId::new("c-p1"));
    assert_eq!(camera.handle, MediaHandle::Subscriber(subscriber_for("c-p1")));
    let screen = p1.stream(StreamKind::Screen).unwrap();
    assert_eq!(screen.connection_id, ConnectionId::new("c-p1-screen"));
    assert!(screen.enlarged);
}

#[tokio::test]
async fn test_repeated_stream_refreshes_in_place() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    h.dispatch(stream_created(SessionKind::Webcam, "c-bob-2", "bob", "Bob"))
        .await;

    let bob = h.remote("bob");
    assert_eq!(bob.streams.len(), 1);
    assert_eq!(
        bob.stream(StreamKind::Camera).unwrap().connection_id,
        ConnectionId::new("c-bob-2")
    );
    assert_eq!(h.directory.remote_snapshots().len(), 1);
}

#[tokio::test]
async fn test_removing_only_connection_removes_participant() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-cy", "cy", "Cy"))
        .await;
    let mut remotes = h.directory.subscribe_remotes();
    remotes.borrow_and_update();

    h.dispatch(connection_destroyed(SessionKind::Webcam, "c-bob"))
        .await;

    assert!(remotes.has_changed().unwrap());
    let snapshot = remotes.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.iter().all(|p| p.id.as_str() == "cy"));
}

#[tokio::test]
async fn test_removing_screen_enlarges_last_remaining_screen() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Screen, "s-p1", "P1", "Bob"))
        .await;
    h.dispatch(stream_created(SessionKind::Screen, "s-p2", "P2", "Cy"))
        .await;
    // The later share took priority.
    assert!(!h.remote("P1").stream(StreamKind::Screen).unwrap().enlarged);
    assert!(h.remote("P2").stream(StreamKind::Screen).unwrap().enlarged);

    h.dispatch(connection_destroyed(SessionKind::Screen, "s-p2"))
        .await;

    assert!(h.directory.remote_snapshot(&"P2".into()).is_none());
    assert!(h.remote("P1").stream(StreamKind::Screen).unwrap().enlarged);
}

#[tokio::test]
async fn test_unknown_connection_destroyed_is_ignored() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    h.dispatch(connection_destroyed(SessionKind::Webcam, "c-ghost"))
        .await;

    assert_eq!(h.directory.remote_snapshots().len(), 1);
}

#[tokio::test]
async fn test_stream_property_changes_update_remote_flags() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    h.dispatch(TransportEvent::StreamPropertyChanged {
        connection_id: "c-bob".into(),
        property: StreamProperty::AudioActive,
        enabled: false,
    })
    .await;

    let camera = h.remote("bob").stream(StreamKind::Camera).unwrap().clone();
    assert!(!camera.audio_enabled);
    assert!(camera.video_enabled);
}

// ============================================================================
// Reconnection and signals
// ============================================================================

#[tokio::test]
async fn test_reconnecting_sets_connection_lost() {
    let h = joined().await;

    h.dispatch(TransportEvent::Reconnecting {
        session: SessionKind::Webcam,
    })
    .await;

    // Late subscribers see the current value.
    let lost = h.coordinator.subscribe_connection_lost();
    assert!(*lost.borrow());

    h.dispatch(TransportEvent::Reconnected {
        session: SessionKind::Webcam,
    })
    .await;
    assert!(!h.coordinator.is_connection_lost());
}

#[tokio::test]
async fn test_nickname_signal_updates_remote_and_is_broadcast() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;
    let mut signals = h.coordinator.subscribe_signals();

    h.dispatch(nickname_signal("c-bob", "Robert")).await;

    assert_eq!(h.remote("bob").nickname, "Robert");
    let received = signals.try_recv().unwrap();
    assert_eq!(received.kind, SignalType::NicknameChanged);
    assert_eq!(received.from, Some(ConnectionId::new("c-bob")));
}

#[tokio::test]
async fn test_own_nickname_signal_does_not_touch_remotes() {
    let h = joined().await;

    h.dispatch(nickname_signal("con-webcam-1", "Someone")).await;

    assert_eq!(h.local().nickname, "Ada");
    assert!(h.directory.remote_snapshots().is_empty());
}

#[tokio::test]
async fn test_custom_signal_is_broadcast() {
    let h = joined().await;
    let mut signals = h.coordinator.subscribe_signals();

    h.dispatch(TransportEvent::SignalReceived(ReceivedSignal {
        kind: SignalType::from_wire("signal:raiseHand"),
        from: Some("c-bob".into()),
        data: "{}".into(),
    }))
    .await;

    assert_eq!(
        signals.try_recv().unwrap().kind,
        SignalType::Custom("raiseHand".into())
    );
}

#[tokio::test]
async fn test_force_mute_signal() {
    let h = joined().await;
    h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await;

    h.dispatch(force_mute_signal("c-mod", "me", true)).await;
    h.dispatch(force_mute_signal("c-mod", "bob", true)).await;

    assert!(h.local().muted_forcibly);
    assert!(h.remote("bob").muted_forcibly);

    h.dispatch(force_mute_signal("c-mod", "me", false)).await;
    assert!(!h.local().muted_forcibly);
}

// ============================================================================
// Event loop
// ============================================================================

#[tokio::test]
async fn test_event_loop_drains_until_sender_dropped() {
    let h = joined().await;
    let (tx, rx) = mpsc::channel(8);
    let events = SessionEvents::new(
        Arc::clone(&h.coordinator),
        Arc::clone(&h.directory),
        "Participant",
    );
    let handle = events.spawn(rx, CancellationToken::new());

    tx.send(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob"))
        .await
        .unwrap();
    tx.send(stream_created(SessionKind::Webcam, "c-cy", "cy", "Cy"))
        .await
        .unwrap();
    drop(tx);
    handle.await.unwrap();

    assert_eq!(h.directory.remote_snapshots().len(), 2);
}

#[tokio::test]
async fn test_event_loop_stops_on_cancellation() {
    let h = joined().await;
    let (_tx, rx) = mpsc::channel::<TransportEvent>(8);
    let token = CancellationToken::new();
    let events = SessionEvents::new(
        Arc::clone(&h.coordinator),
        Arc::clone(&h.directory),
        "Participant",
    );
    let handle = events.spawn(rx, token.clone());

    token.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("event loop should stop")
        .unwrap();
}
