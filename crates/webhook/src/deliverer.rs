//! Webhook delivery with retry, backoff, and dead-lettering

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use voicebridge_core::{validate_outbound_url, Envelope};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::models::{DeadLetter, DeliveryAttempt, DeliveryStatus, WebhookEndpoint};
use crate::repository::WebhookRepository;
use crate::signer::{sign, SIGNATURE_HEADER};

/// Breaker cache cap. Eviction picks an arbitrary entry.
const MAX_BREAKERS: usize = 10_000;
/// Response bodies are truncated to this size in delivery records.
const MAX_RESPONSE_BODY: usize = 4096;

const EVENT_HEADER: &str = "X-Voicetyped-Event";
const DELIVERY_HEADER: &str = "X-Voicetyped-Delivery";

/// Delivery settings.
#[derive(Debug, Clone)]
pub struct DelivererConfig {
    /// Total attempts before dead-lettering.
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_timeout: Duration,
    /// Test-only toggle relaxing the SSRF check.
    pub allow_private_urls: bool,
}

impl Default for DelivererConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            breaker_failure_threshold: 5,
            breaker_reset_timeout: Duration::from_secs(60),
            allow_private_urls: false,
        }
    }
}

enum Outcome {
    Success,
    Failure(String),
}

/// Delivers event envelopes to registered endpoints.
pub struct Deliverer {
    repo: Arc<dyn WebhookRepository>,
    client: reqwest::Client,
    config: DelivererConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Deliverer {
    pub fn new(repo: Arc<dyn WebhookRepository>, config: DelivererConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_default();
        Self {
            repo,
            client,
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    fn breaker_for(&self, webhook_id: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        if let Some(cb) = breakers.get(webhook_id) {
            return Arc::clone(cb);
        }

        if breakers.len() >= MAX_BREAKERS {
            if let Some(evict) = breakers.keys().next().cloned() {
                breakers.remove(&evict);
            }
        }

        let cb = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: self.config.breaker_failure_threshold,
            reset_timeout: self.config.breaker_reset_timeout,
            half_open_max_attempts: 1,
        }));
        breakers.insert(webhook_id.to_string(), Arc::clone(&cb));
        cb
    }

    /// Deliver an envelope to an endpoint, retrying with exponential backoff
    /// and dead-lettering after the final attempt.
    pub async fn deliver(&self, wh: &WebhookEndpoint, env: &Envelope, cancel: &CancellationToken) {
        if let Err(err) = validate_outbound_url(&wh.url, self.config.allow_private_urls).await {
            tracing::error!(
                webhook_id = %wh.id,
                url = %wh.url,
                error = %err,
                "webhook URL failed SSRF validation"
            );
            return;
        }

        let body = match serde_json::to_vec(env) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(webhook_id = %wh.id, error = %err, "marshal envelope");
                return;
            }
        };
        let breaker = self.breaker_for(&wh.id);

        let mut attempt: u32 = 1;
        loop {
            let outcome = if breaker.allow_request() {
                self.attempt_once(wh, env, &body, attempt, &breaker).await
            } else {
                // A rejected request counts as a failure attempt.
                Outcome::Failure("circuit open".to_string())
            };

            let error = match outcome {
                Outcome::Success => return,
                Outcome::Failure(error) => error,
            };

            if attempt >= self.config.max_retries {
                let dl = DeadLetter {
                    id: uuid::Uuid::new_v4().to_string(),
                    webhook_id: wh.id.clone(),
                    event_id: env.id.clone(),
                    event_type: env.event_type.as_str().to_string(),
                    payload: String::from_utf8_lossy(&body).into_owned(),
                    last_error: error,
                    attempts: attempt,
                    replayable: true,
                    created_at: Utc::now(),
                };
                if let Err(err) = self.repo.create_dead_letter(dl).await {
                    tracing::error!(webhook_id = %wh.id, error = %err, "create dead letter");
                }
                return;
            }

            let backoff = self
                .config
                .backoff_initial
                .saturating_mul(1u32 << (attempt - 1).min(31))
                .min(self.config.backoff_max);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }

    async fn attempt_once(
        &self,
        wh: &WebhookEndpoint,
        env: &Envelope,
        body: &[u8],
        attempt: u32,
        breaker: &CircuitBreaker,
    ) -> Outcome {
        let signature = sign(&wh.secret, body);

        let start = Instant::now();
        let response = self
            .client
            .post(&wh.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, env.event_type.as_str())
            .header(DELIVERY_HEADER, env.id.as_str())
            .body(body.to_vec())
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as i64;

        let mut record = DeliveryAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            webhook_id: wh.id.clone(),
            event_id: env.id.clone(),
            event_type: env.event_type.as_str().to_string(),
            request_body: String::from_utf8_lossy(body).into_owned(),
            response_code: 0,
            response_body: String::new(),
            attempt_number: attempt,
            status: DeliveryStatus::Failed,
            error: String::new(),
            duration_ms,
            next_retry_at: None,
            created_at: Utc::now(),
        };

        let outcome = match response {
            Err(err) => {
                record.error = err.to_string();
                Outcome::Failure(record.error.clone())
            }
            Ok(resp) => {
                let status = resp.status();
                record.response_code = status.as_u16();
                if let Ok(bytes) = resp.bytes().await {
                    let truncated = &bytes[..bytes.len().min(MAX_RESPONSE_BODY)];
                    record.response_body = String::from_utf8_lossy(truncated).into_owned();
                }
                if status.is_success() {
                    record.status = DeliveryStatus::Success;
                    Outcome::Success
                } else {
                    record.error = format!("HTTP {}", status.as_u16());
                    Outcome::Failure(record.error.clone())
                }
            }
        };

        match outcome {
            Outcome::Success => breaker.record_success(),
            Outcome::Failure(_) => breaker.record_failure(),
        }

        if let Err(err) = self.repo.record_delivery(record).await {
            tracing::error!(webhook_id = %wh.id, error = %err, "record delivery");
        }
        outcome
    }

    #[cfg(test)]
    pub(crate) fn breaker_count(&self) -> usize {
        self.breakers.lock().len()
    }
}
