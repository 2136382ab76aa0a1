//! Queue subscriber and dead-letter replay

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicebridge_core::{Envelope, Publisher, TaskPool};

use crate::deliverer::Deliverer;
use crate::repository::WebhookRepository;
use crate::WebhookError;

/// Routes queued events to matching webhook endpoints.
pub struct Subscriber {
    repo: Arc<dyn WebhookRepository>,
    deliverer: Arc<Deliverer>,
    pool: TaskPool,
    cancel: CancellationToken,
}

impl Subscriber {
    pub fn new(
        repo: Arc<dyn WebhookRepository>,
        deliverer: Arc<Deliverer>,
        pool: TaskPool,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            deliverer,
            pool,
            cancel,
        })
    }

    /// Handle one serialized envelope from the queue: find the endpoints
    /// subscribed to its type and submit one delivery task per endpoint.
    pub async fn handle(&self, message: &[u8]) -> Result<(), WebhookError> {
        let env: Envelope = serde_json::from_slice(message)?;
        let endpoints = self.repo.list_active_by_event_type(env.event_type).await?;

        for wh in endpoints {
            let deliverer = Arc::clone(&self.deliverer);
            let env = env.clone();
            let cancel = self.cancel.clone();
            self.pool.spawn(async move {
                deliverer.deliver(&wh, &env, &cancel).await;
            });
        }
        Ok(())
    }

    /// Drain the queue until it closes or the subscriber is cancelled.
    pub fn run(self: &Arc<Self>, mut queue_rx: mpsc::Receiver<Vec<u8>>) {
        let subscriber = Arc::clone(self);
        let cancel = self.cancel.clone();
        self.pool.spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => return,
                    message = queue_rx.recv() => match message {
                        Some(message) => message,
                        None => return,
                    },
                };
                if let Err(err) = subscriber.handle(&message).await {
                    tracing::error!(error = %err, "webhook subscriber: handle event");
                }
            }
        });
    }
}

/// Re-emit a dead letter through the publisher and mark it consumed.
///
/// The mark is not atomic with the re-emit; a crash in between replays the
/// letter twice, so consumers must treat replay as at-least-once.
pub async fn replay_dead_letter(
    repo: &Arc<dyn WebhookRepository>,
    publisher: &Publisher,
    dead_letter_id: &str,
) -> Result<Envelope, WebhookError> {
    let dl = repo.get_dead_letter(dead_letter_id).await?;
    if !dl.replayable {
        return Err(WebhookError::NotReplayable(dead_letter_id.to_string()));
    }

    let env: Envelope = serde_json::from_str(&dl.payload)?;
    publisher
        .emit(env.event_type, &env.session_id, &env.data)
        .await
        .map_err(|err| WebhookError::Publish(err.to_string()))?;

    repo.mark_dead_letter_replayed(dead_letter_id).await?;
    Ok(env)
}
