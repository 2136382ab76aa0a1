//! Queue transport abstraction
//!
//! The durable queue between the event publisher and the webhook subscriber
//! is deployment-specific. [`MemoryQueue`] backs single-process deployments
//! and the test suite.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0:?} is closed")]
    Closed(String),
    #[error("queue transport: {0}")]
    Transport(String),
}

/// Transport that carries serialized envelopes to durable consumers.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn publish(&self, queue_ref: &str, payload: Vec<u8>) -> Result<(), QueueError>;
}

/// In-process queue backed by a bounded tokio channel.
pub struct MemoryQueue {
    tx: mpsc::Sender<Vec<u8>>,
}

impl MemoryQueue {
    /// Returns the queue and the receiver the consumer drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn publish(&self, queue_ref: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| QueueError::Closed(queue_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_delivers_in_order() {
        let (queue, mut rx) = MemoryQueue::new(4);
        queue.publish("events", b"one".to_vec()).await.unwrap();
        queue.publish("events", b"two".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"one");
        assert_eq!(rx.recv().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_memory_queue_closed() {
        let (queue, rx) = MemoryQueue::new(1);
        drop(rx);
        assert!(queue.publish("events", vec![]).await.is_err());
    }
}
