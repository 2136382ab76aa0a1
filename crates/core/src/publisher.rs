//! Event publisher
//!
//! Emits typed events to the external queue and fans them out to local
//! in-process subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::{Envelope, EventType};
use crate::queue::{QueueError, QueueTransport};

const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("marshal event payload: {0}")]
    Marshal(#[from] serde_json::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Publishes typed events and supports local in-process subscriptions.
pub struct Publisher {
    source: String,
    queue_ref: String,
    queue: Arc<dyn QueueTransport>,
    subscribers: RwLock<HashMap<String, mpsc::Sender<Envelope>>>,
}

impl Publisher {
    pub fn new(
        queue: Arc<dyn QueueTransport>,
        source: impl Into<String>,
        queue_ref: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            queue_ref: queue_ref.into(),
            queue,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a typed event.
    ///
    /// Local subscriber sends never block: a subscriber whose buffer is full
    /// drops the event with a warning. Queue publish errors are surfaced.
    pub async fn emit<T: Serialize>(
        &self,
        event_type: EventType,
        session_id: &str,
        data: &T,
    ) -> Result<(), EventError> {
        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            source: self.source.clone(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            data: serde_json::to_value(data)?,
            metadata: None,
        };

        {
            let subscribers = self.subscribers.read();
            for (id, tx) in subscribers.iter() {
                if tx.try_send(envelope.clone()).is_err() {
                    tracing::warn!(
                        subscriber = %id,
                        event_type = %event_type,
                        "event dropped: subscriber buffer full"
                    );
                }
            }
        }

        let payload = serde_json::to_vec(&envelope)?;
        self.queue.publish(&self.queue_ref, payload).await?;
        Ok(())
    }

    /// Register a local subscription.
    ///
    /// The returned channel receives every subsequent envelope, up to drops
    /// on buffer overflow. Call [`Publisher::unsubscribe`] with the same id
    /// to clean up.
    pub fn subscribe(&self, id: impl Into<String>, buf_size: usize) -> mpsc::Receiver<Envelope> {
        let buf = if buf_size == 0 {
            DEFAULT_SUBSCRIBER_BUFFER
        } else {
            buf_size
        };
        let (tx, rx) = mpsc::channel(buf);
        self.subscribers.write().insert(id.into(), tx);
        rx
    }

    /// Remove a local subscription, closing its channel.
    pub fn unsubscribe(&self, id: &str) {
        self.subscribers.write().remove(id);
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StateTransitionData;
    use crate::queue::MemoryQueue;

    fn publisher() -> (Arc<Publisher>, mpsc::Receiver<Vec<u8>>) {
        let (queue, rx) = MemoryQueue::new(16);
        let publisher = Publisher::new(Arc::new(queue), "test", "events.test");
        (Arc::new(publisher), rx)
    }

    #[tokio::test]
    async fn test_emit_reaches_queue_and_subscriber() {
        let (publisher, mut queue_rx) = publisher();
        let mut sub = publisher.subscribe("local", 8);

        publisher
            .emit(
                EventType::StateTransition,
                "s1",
                &StateTransitionData {
                    from_state: "greeting".into(),
                    to_state: "handle".into(),
                    trigger_event: "hi".into(),
                    dialog_name: "test".into(),
                },
            )
            .await
            .unwrap();

        let env = sub.recv().await.unwrap();
        assert_eq!(env.event_type, EventType::StateTransition);
        assert_eq!(env.session_id, "s1");
        assert_eq!(env.source, "test");

        let raw = queue_rx.recv().await.unwrap();
        let queued: Envelope = serde_json::from_slice(&raw).unwrap();
        assert_eq!(queued.id, env.id);
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_without_blocking() {
        let (publisher, _queue_rx) = publisher();
        let mut sub = publisher.subscribe("slow", 1);

        for _ in 0..3 {
            publisher
                .emit(EventType::SystemError, "s1", &serde_json::json!({}))
                .await
                .unwrap();
        }

        // Only the first envelope fits; the rest were dropped, not queued.
        assert!(sub.recv().await.is_some());
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let (publisher, _queue_rx) = publisher();
        let mut sub = publisher.subscribe("gone", 8);
        publisher.unsubscribe("gone");
        assert!(sub.recv().await.is_none());
    }
}
