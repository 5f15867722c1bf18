//! Client wiring.
//!
//! Builds the coordinator, directory, transcription manager and orchestrator
//! around one [`MediaTransport`], and runs the session event loop until
//! [`ConferenceClient::shutdown`].

use crate::config::Config;
use crate::coordinator::{DualSessionCoordinator, ExecutionContext};
use crate::errors::ClientError;
use crate::directory::ParticipantDirectory;
use crate::events::SessionEvents;
use crate::orchestrator::ActionOrchestrator;
use crate::stt::SttSubscriptionManager;
use crate::transport::{MediaTransport, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Channel the transport pushes its events into.
#[must_use]
pub fn event_channel(
    config: &Config,
) -> (mpsc::Sender<TransportEvent>, mpsc::Receiver<TransportEvent>) {
    mpsc::channel(config.event_channel_buffer)
}

/// A running conference client.
pub struct ConferenceClient {
    coordinator: Arc<DualSessionCoordinator>,
    directory: Arc<ParticipantDirectory>,
    stt: SttSubscriptionManager,
    orchestrator: ActionOrchestrator,
    cancel_token: CancellationToken,
    events_task: JoinHandle<()>,
}

impl ConferenceClient {
    /// Wire the components and spawn the event loop. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn start(
        config: &Config,
        transport: Arc<dyn MediaTransport>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        let cancel_token = CancellationToken::new();

        let coordinator = Arc::new(DualSessionCoordinator::new(
            transport,
            ExecutionContext::from(config),
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

        let events_task = SessionEvents::new(
            Arc::clone(&coordinator),
            Arc::clone(&directory),
            config.default_nickname.clone(),
        )
        .spawn(events, cancel_token.child_token());

        info!(
            target: "cc.client",
            screen_capture_supported = config.screen_capture_supported,
            "Conference client started"
        );

        Self {
            coordinator,
            directory,
            stt,
            orchestrator,
            cancel_token,
            events_task,
        }
    }

    /// Load [`Config`] from the environment, create the event channel and
    /// start. Returns the sender the transport should push events into.
    pub fn from_env(
        transport: Arc<dyn MediaTransport>,
    ) -> Result<(Self, mpsc::Sender<TransportEvent>), ClientError> {
        let config = Config::from_env()?;
        let (tx, rx) = event_channel(&config);
        Ok((Self::start(&config, transport, rx), tx))
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<DualSessionCoordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<ParticipantDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn stt(&self) -> &SttSubscriptionManager {
        &self.stt
    }

    #[must_use]
    pub fn orchestrator(&self) -> &ActionOrchestrator {
        &self.orchestrator
    }

    /// Leave the conference, stop the event loop and wait for it.
    pub async fn shutdown(self) {
        self.orchestrator.leave().await;
        self.cancel_token.cancel();

        if let Err(e) = self.events_task.await {
            warn!(target: "cc.client", error = %e, "Event loop task failed");
        }
        info!(target: "cc.client", "Conference client stopped");
    }
}
