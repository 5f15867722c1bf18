//! Component harness for integration tests.
//!
//! Wires the coordinator, directory, transcription manager, orchestrator and
//! event handler around a [`MockTransport`], without spawning the event loop.
//! Tests feed events through [`ClientHarness::dispatch`].
//!
//! # Example
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_remote_joins() {
//!     let h = ClientHarness::joined(MockTransport::new(), "me", "Ada").await;
//!     h.dispatch(stream_created(SessionKind::Webcam, "c-bob", "bob", "Bob")).await;
//!     assert_eq!(h.directory.remote_snapshots().len(), 1);
//! }
//! ```

use crate::fixtures::{test_config, test_context, TestJoin};
use crate::mock_transport::MockTransport;
use common::types::ParticipantId;
use conference_client::coordinator::{DualSessionCoordinator, ExecutionContext};
use conference_client::directory::ParticipantDirectory;
use conference_client::events::SessionEvents;
use conference_client::orchestrator::ActionOrchestrator;
use conference_client::snapshot::ParticipantSnapshot;
use conference_client::stt::SttSubscriptionManager;
use conference_client::transport::TransportEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ClientHarness {
    pub transport: MockTransport,
    pub coordinator: Arc<DualSessionCoordinator>,
    pub directory: Arc<ParticipantDirectory>,
    pub stt: SttSubscriptionManager,
    pub orchestrator: ActionOrchestrator,
    pub events: SessionEvents,
    pub cancel_token: CancellationToken,
}

impl ClientHarness {
    /// Harness with screen capture supported and no device fallback.
    #[must_use]
    pub fn new(transport: MockTransport) -> Self {
        Self::with_context(transport, test_context())
    }

    #[must_use]
    pub fn with_context(transport: MockTransport, context: ExecutionContext) -> Self {
        let config = test_config();
        let cancel_token = CancellationToken::new();
        let coordinator = Arc::new(DualSessionCoordinator::new(
            Arc::new(transport.clone()),
            context,
        ));
        let directory = Arc::new(ParticipantDirectory::new());
        let stt = SttSubscriptionManager::new(
            Arc::clone(&coordinator),
            Arc::clone(&directory),
            config.stt_retry_interval,
            config.stt_language.clone(),
            cancel_token.child_token(),
        );
        let orchestrator = ActionOrchestrator::new(
            Arc::clone(&coordinator),
            Arc::clone(&directory),
            stt.clone(),
        );
        let events = SessionEvents::new(
            Arc::clone(&coordinator),
            Arc::clone(&directory),
            config.default_nickname,
        );

        Self {
            transport,
            coordinator,
            directory,
            stt,
            orchestrator,
            events,
            cancel_token,
        }
    }

    /// Harness with a local participant joined (camera and microphone on).
    pub async fn joined(transport: MockTransport, id: &str, nickname: &str) -> Self {
        let harness = Self::new(transport);
        harness
            .orchestrator
            .join(TestJoin::new(id, nickname).build())
            .await
            .expect("join should succeed");
        harness
    }

    pub async fn dispatch(&self, event: TransportEvent) {
        self.events.dispatch(event).await;
    }

    /// Current local snapshot. Panics before join.
    #[must_use]
    pub fn local(&self) -> ParticipantSnapshot {
        self.directory
            .local_snapshot()
            .expect("local participant should be set")
    }

    /// Current snapshot of a remote participant. Panics when absent.
    #[must_use]
    pub fn remote(&self, id: &str) -> ParticipantSnapshot {
        self.directory
            .remote_snapshot(&ParticipantId::new(id))
            .unwrap_or_else(|| panic!("remote participant {id} should exist"))
    }
}

impl Drop for ClientHarness {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
