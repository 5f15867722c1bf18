//! Speech-to-text subscription manager.
//!
//! Subscribes every remote camera stream to the transcription service, one
//! at a time. A pass stops at the first failure; readiness is true only
//! when every remote camera is subscribed. While not ready a single retry
//! task re-runs the pass every `retry_interval` until it succeeds or
//! [`SttSubscriptionManager::unsubscribe`] cancels it.

use crate::coordinator::DualSessionCoordinator;
use crate::directory::ParticipantDirectory;
use crate::observability::metrics;
use crate::transport::SubscriberHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

struct RetryTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

struct SttInner {
    coordinator: Arc<DualSessionCoordinator>,
    directory: Arc<ParticipantDirectory>,
    retry_interval: Duration,
    language: String,
    parent_token: CancellationToken,
    /// Held for the whole pass so passes never interleave.
    subscribed: Mutex<Vec<SubscriberHandle>>,
    retry: Mutex<Option<RetryTask>>,
    ready: watch::Sender<bool>,
}

impl SttInner {
    /// One sequential pass. Returns readiness.
    async fn run_pass(&self) -> bool {
        let mut subscribed = self.subscribed.lock().await;
        let targets = self.directory.remote_camera_subscribers().await;

        // Remotes that left since the last pass.
        let before = subscribed.len();
        subscribed.retain(|s| targets.contains(s));
        if subscribed.len() < before {
            debug!(
                target: "cc.stt",
                pruned = before - subscribed.len(),
                "Dropped subscriptions of departed streams"
            );
        }

        let mut successes = 0usize;
        for subscriber in &targets {
            if subscribed.contains(subscriber) {
                successes += 1;
                continue;
            }
            match self
                .coordinator
                .subscribe_to_transcription(subscriber, &self.language)
                .await
            {
                Ok(()) => {
                    subscribed.push(subscriber.clone());
                    successes += 1;
                }
                Err(e) => {
                    warn!(
                        target: "cc.stt",
                        subscriber = %subscriber,
                        error = %e,
                        "Transcription subscription failed, stopping pass"
                    );
                    break;
                }
            }
        }

        let ready = successes == targets.len();
        self.ready.send_replace(ready);
        metrics::record_stt_pass(if ready { "ready" } else { "partial" });
        debug!(
            target: "cc.stt",
            successes,
            total = targets.len(),
            ready,
            "Transcription pass finished"
        );
        ready
    }
}

/// Owner of transcription subscriptions and their retry task.
#[derive(Clone)]
pub struct SttSubscriptionManager {
    inner: Arc<SttInner>,
}

impl SttSubscriptionManager {
    /// `parent_token` bounds the lifetime of any retry task.
    #[must_use]
    pub fn new(
        coordinator: Arc<DualSessionCoordinator>,
        directory: Arc<ParticipantDirectory>,
        retry_interval: Duration,
        language: impl Into<String>,
        parent_token: CancellationToken,
    ) -> Self {
        let (ready, _) = watch::channel(true);
        Self {
            inner: Arc::new(SttInner {
                coordinator,
                directory,
                retry_interval,
                language: language.into(),
                parent_token,
                subscribed: Mutex::new(Vec::new()),
                retry: Mutex::new(None),
                ready,
            }),
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    #[must_use]
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.inner.ready.subscribe()
    }

    pub async fn has_pending_retry(&self) -> bool {
        self.inner
            .retry
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub async fn subscribed(&self) -> Vec<SubscriberHandle> {
        self.inner.subscribed.lock().await.clone()
    }

    /// Subscribe every remote camera. A pending retry is replaced.
    #[instrument(skip_all, name = "cc.stt.subscribe")]
    pub async fn subscribe_remotes(&self) -> bool {
        self.cancel_retry().await;

        let ready = self.inner.run_pass().await;
        if !ready {
            self.schedule_retry().await;
        }
        ready
    }

    async fn schedule_retry(&self) {
        let cancel_token = self.inner.parent_token.child_token();
        let inner = Arc::clone(&self.inner);
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(target: "cc.stt", "Transcription retry cancelled");
                        break;
                    }
                    () = tokio::time::sleep(inner.retry_interval) => {
                        if inner.run_pass().await {
                            info!(target: "cc.stt", "Transcription subscriptions ready");
                            break;
                        }
                    }
                }
            }
        });

        debug!(
            target: "cc.stt",
            retry_in_ms = u64::try_from(self.inner.retry_interval.as_millis()).unwrap_or(u64::MAX),
            "Transcription retry scheduled"
        );
        *self.inner.retry.lock().await = Some(RetryTask {
            cancel_token,
            handle,
        });
    }

    async fn cancel_retry(&self) {
        if let Some(task) = self.inner.retry.lock().await.take() {
            task.cancel_token.cancel();
        }
    }

    /// Cancel any pending retry, tear down every subscription (failures are
    /// logged) and reset readiness to `true`. Safe with nothing subscribed.
    #[instrument(skip_all, name = "cc.stt.unsubscribe")]
    pub async fn unsubscribe(&self) {
        self.cancel_retry().await;

        let mut subscribed = self.inner.subscribed.lock().await;
        for subscriber in subscribed.drain(..) {
            if let Err(e) = self
                .inner
                .coordinator
                .unsubscribe_from_transcription(&subscriber)
                .await
            {
                warn!(
                    target: "cc.stt",
                    subscriber = %subscriber,
                    error = %e,
                    "Transcription unsubscribe failed"
                );
            }
        }
        self.inner.ready.send_replace(true);
        debug!(target: "cc.stt", "Transcription subscriptions cleared");
    }
}
