//! Webhook delivery
//!
//! Fans per-session events out to registered HTTP subscribers: endpoint
//! matching, HMAC signing, retries with exponential backoff, per-endpoint
//! circuit breaking, and dead-lettering with manual replay.

pub mod breaker;
pub mod deliverer;
pub mod models;
pub mod repository;
pub mod signer;
pub mod subscriber;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use deliverer::{Deliverer, DelivererConfig};
pub use models::{DeadLetter, DeliveryAttempt, DeliveryStatus, WebhookEndpoint};
pub use repository::{MemoryRepository, WebhookRepository};
pub use signer::{generate_secret, sign, verify, SIGNATURE_HEADER};
pub use subscriber::{replay_dead_letter, Subscriber};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook {0:?} not found")]
    EndpointNotFound(String),

    #[error("dead letter {0:?} not found")]
    DeadLetterNotFound(String),

    #[error("dead letter {0:?} is not replayable")]
    NotReplayable(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] voicebridge_core::UrlError),

    #[error("publish: {0}")]
    Publish(String),

    #[error("repository: {0}")]
    Repository(String),
}
