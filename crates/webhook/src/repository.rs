//! Webhook persistence boundary
//!
//! The relational layer lives behind this trait; [`MemoryRepository`] backs
//! tests and single-process deployments as a write-through store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use voicebridge_core::EventType;

use crate::models::{DeadLetter, DeliveryAttempt, WebhookEndpoint};
use crate::WebhookError;

/// CRUD operations for webhook-related records.
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create_endpoint(&self, wh: WebhookEndpoint) -> Result<WebhookEndpoint, WebhookError>;

    async fn get_endpoint(&self, id: &str) -> Result<WebhookEndpoint, WebhookError>;

    /// All endpoints that are not soft-deleted.
    async fn list_endpoints(&self) -> Result<Vec<WebhookEndpoint>, WebhookError>;

    /// Active endpoints subscribed to the given event type.
    async fn list_active_by_event_type(
        &self,
        event_type: EventType,
    ) -> Result<Vec<WebhookEndpoint>, WebhookError>;

    async fn update_endpoint(&self, wh: WebhookEndpoint) -> Result<WebhookEndpoint, WebhookError>;

    /// Soft delete.
    async fn delete_endpoint(&self, id: &str) -> Result<(), WebhookError>;

    async fn record_delivery(&self, attempt: DeliveryAttempt) -> Result<(), WebhookError>;

    /// Delivery attempts for a webhook, newest first.
    async fn list_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeliveryAttempt>, WebhookError>;

    async fn create_dead_letter(&self, dl: DeadLetter) -> Result<(), WebhookError>;

    async fn get_dead_letter(&self, id: &str) -> Result<DeadLetter, WebhookError>;

    /// Replayable dead letters for a webhook, newest first.
    async fn list_dead_letters(&self, webhook_id: &str) -> Result<Vec<DeadLetter>, WebhookError>;

    async fn mark_dead_letter_replayed(&self, id: &str) -> Result<(), WebhookError>;
}

#[derive(Default)]
struct MemoryInner {
    endpoints: HashMap<String, WebhookEndpoint>,
    deliveries: Vec<DeliveryAttempt>,
    dead_letters: Vec<DeadLetter>,
}

/// In-memory repository.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<MemoryInner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookRepository for MemoryRepository {
    async fn create_endpoint(&self, wh: WebhookEndpoint) -> Result<WebhookEndpoint, WebhookError> {
        self.inner.write().endpoints.insert(wh.id.clone(), wh.clone());
        Ok(wh)
    }

    async fn get_endpoint(&self, id: &str) -> Result<WebhookEndpoint, WebhookError> {
        self.inner
            .read()
            .endpoints
            .get(id)
            .filter(|wh| wh.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| WebhookError::EndpointNotFound(id.to_string()))
    }

    async fn list_endpoints(&self) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        Ok(self
            .inner
            .read()
            .endpoints
            .values()
            .filter(|wh| wh.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn list_active_by_event_type(
        &self,
        event_type: EventType,
    ) -> Result<Vec<WebhookEndpoint>, WebhookError> {
        Ok(self
            .inner
            .read()
            .endpoints
            .values()
            .filter(|wh| wh.deleted_at.is_none() && wh.is_active && wh.subscribes_to(event_type))
            .cloned()
            .collect())
    }

    async fn update_endpoint(&self, wh: WebhookEndpoint) -> Result<WebhookEndpoint, WebhookError> {
        let mut inner = self.inner.write();
        if !inner.endpoints.contains_key(&wh.id) {
            return Err(WebhookError::EndpointNotFound(wh.id));
        }
        inner.endpoints.insert(wh.id.clone(), wh.clone());
        Ok(wh)
    }

    async fn delete_endpoint(&self, id: &str) -> Result<(), WebhookError> {
        let mut inner = self.inner.write();
        let wh = inner
            .endpoints
            .get_mut(id)
            .ok_or_else(|| WebhookError::EndpointNotFound(id.to_string()))?;
        wh.deleted_at = Some(Utc::now());
        wh.is_active = false;
        Ok(())
    }

    async fn record_delivery(&self, attempt: DeliveryAttempt) -> Result<(), WebhookError> {
        self.inner.write().deliveries.push(attempt);
        Ok(())
    }

    async fn list_deliveries(
        &self,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeliveryAttempt>, WebhookError> {
        let inner = self.inner.read();
        let mut attempts: Vec<DeliveryAttempt> = inner
            .deliveries
            .iter()
            .filter(|a| a.webhook_id == webhook_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let attempts = attempts.into_iter().skip(offset);
        Ok(if limit > 0 {
            attempts.take(limit).collect()
        } else {
            attempts.collect()
        })
    }

    async fn create_dead_letter(&self, dl: DeadLetter) -> Result<(), WebhookError> {
        self.inner.write().dead_letters.push(dl);
        Ok(())
    }

    async fn get_dead_letter(&self, id: &str) -> Result<DeadLetter, WebhookError> {
        self.inner
            .read()
            .dead_letters
            .iter()
            .find(|dl| dl.id == id)
            .cloned()
            .ok_or_else(|| WebhookError::DeadLetterNotFound(id.to_string()))
    }

    async fn list_dead_letters(&self, webhook_id: &str) -> Result<Vec<DeadLetter>, WebhookError> {
        let inner = self.inner.read();
        let mut letters: Vec<DeadLetter> = inner
            .dead_letters
            .iter()
            .filter(|dl| dl.webhook_id == webhook_id && dl.replayable)
            .cloned()
            .collect();
        letters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(letters)
    }

    async fn mark_dead_letter_replayed(&self, id: &str) -> Result<(), WebhookError> {
        let mut inner = self.inner.write();
        let dl = inner
            .dead_letters
            .iter_mut()
            .find(|dl| dl.id == id)
            .ok_or_else(|| WebhookError::DeadLetterNotFound(id.to_string()))?;
        dl.replayable = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_soft_delete_hides_endpoint() {
        let repo = MemoryRepository::new();
        let wh = repo
            .create_endpoint(WebhookEndpoint::new(
                "n",
                "https://example.com",
                "s",
                vec![EventType::WebhookTest],
            ))
            .await
            .unwrap();

        assert!(repo.get_endpoint(&wh.id).await.is_ok());
        repo.delete_endpoint(&wh.id).await.unwrap();
        assert!(repo.get_endpoint(&wh.id).await.is_err());
        assert!(repo.list_endpoints().await.unwrap().is_empty());
        assert!(repo
            .list_active_by_event_type(EventType::WebhookTest)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_event_type_matching() {
        let repo = MemoryRepository::new();
        repo.create_endpoint(WebhookEndpoint::new(
            "a",
            "https://example.com/a",
            "s",
            vec![EventType::WebhookTest],
        ))
        .await
        .unwrap();
        let mut inactive = WebhookEndpoint::new(
            "b",
            "https://example.com/b",
            "s",
            vec![EventType::WebhookTest],
        );
        inactive.is_active = false;
        repo.create_endpoint(inactive).await.unwrap();

        let matched = repo
            .list_active_by_event_type(EventType::WebhookTest)
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "a");
        assert!(repo
            .list_active_by_event_type(EventType::CallStarted)
            .await
            .unwrap()
            .is_empty());
    }
}
