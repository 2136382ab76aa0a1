//! Webhook records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use voicebridge_core::EventType;

/// A registered webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub name: String,
    pub url: String,
    /// HMAC signing key. Never serialized outward.
    #[serde(skip_serializing)]
    pub secret: String,
    pub event_types: Vec<EventType>,
    pub is_active: bool,
    #[serde(default)]
    pub description: String,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub circuit_state: String,
    pub max_rps: u32,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WebhookEndpoint {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        secret: impl Into<String>,
        event_types: Vec<EventType>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            secret: secret.into(),
            event_types,
            is_active: true,
            description: String::new(),
            failure_count: 0,
            last_failure_at: None,
            circuit_state: crate::breaker::CircuitState::Closed.as_str().to_string(),
            max_rps: 10,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// One attempt to deliver an event to a webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: String,
    pub webhook_id: String,
    pub event_id: String,
    pub event_type: String,
    #[serde(skip_serializing)]
    pub request_body: String,
    /// 0 when no response was received.
    pub response_code: u16,
    #[serde(skip_serializing)]
    pub response_body: String,
    pub attempt_number: u32,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub error: String,
    pub duration_ms: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An event that exhausted all delivery retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub webhook_id: String,
    pub event_id: String,
    pub event_type: String,
    /// The exact serialized envelope as it was being delivered.
    pub payload: String,
    pub last_error: String,
    pub attempts: u32,
    pub replayable: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribes_to() {
        let wh = WebhookEndpoint::new(
            "n",
            "https://example.com/hook",
            "s",
            vec![EventType::WebhookTest, EventType::CallStarted],
        );
        assert!(wh.subscribes_to(EventType::WebhookTest));
        assert!(!wh.subscribes_to(EventType::CallTerminated));
        assert!(wh.is_active);
        assert_eq!(wh.circuit_state, "closed");
    }

    #[test]
    fn test_secret_not_serialized() {
        let wh = WebhookEndpoint::new("n", "u", "topsecret", vec![]);
        let json = serde_json::to_string(&wh).unwrap();
        assert!(!json.contains("topsecret"));
    }
}
