//! Outbound hook execution
//!
//! `call_hook` actions POST session context to an external endpoint and fold
//! the response back into the session. URLs are SSRF-validated before any
//! contact. Hook failures emit `hook.error`; successes emit `hook.result`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use voicebridge_core::events::{HookErrorData, HookResultData};
use voicebridge_core::{validate_outbound_url, EventType, Publisher};

use crate::types::Action;
use crate::DialogError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_BYTES: usize = 1 << 20;

/// How to call an external hook endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookConfig {
    pub url: String,
    /// "bearer", "hmac", or "none"
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub auth_secret: String,
    #[serde(default)]
    pub timeout_sec: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Payload sent to a hook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HookRequest {
    pub session_id: String,
    pub state: String,
    pub event: String,
    pub variables: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digit: Option<String>,
}

/// Expected response from a hook endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookResponse {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub next_state: Option<String>,
}

/// Calls external hook endpoints.
pub struct HookExecutor {
    client: reqwest::Client,
    publisher: Option<Arc<Publisher>>,
    allow_private_urls: bool,
}

impl HookExecutor {
    pub fn new(publisher: Option<Arc<Publisher>>, allow_private_urls: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            publisher,
            allow_private_urls,
        }
    }

    /// Call the hook endpoint and return its parsed response.
    pub async fn execute(
        &self,
        cfg: &HookConfig,
        req: &HookRequest,
    ) -> Result<HookResponse, DialogError> {
        validate_outbound_url(&cfg.url, self.allow_private_urls).await?;

        let body = serde_json::to_vec(req)
            .map_err(|e| DialogError::Hook(format!("marshal hook request: {e}")))?;

        let timeout = if cfg.timeout_sec == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(cfg.timeout_sec)
        };

        let mut http_req = self
            .client
            .post(&cfg.url)
            .timeout(timeout)
            .header("Content-Type", "application/json");

        match cfg.auth_type.as_str() {
            "bearer" => {
                http_req = http_req.header("Authorization", format!("Bearer {}", cfg.auth_secret));
            }
            "hmac" => {
                http_req = http_req.header("X-Hook-Signature", hmac_sign(&cfg.auth_secret, &body));
            }
            _ => {}
        }
        for (k, v) in &cfg.headers {
            http_req = http_req.header(k.as_str(), v.as_str());
        }

        let resp = match http_req.body(body).send().await {
            Ok(resp) => resp,
            Err(err) => {
                self.emit_error(&req.session_id, &cfg.url, &err.to_string())
                    .await;
                return Err(DialogError::Hook(format!("hook request failed: {err}")));
            }
        };

        let status = resp.status();
        let raw = resp
            .bytes()
            .await
            .map_err(|e| DialogError::Hook(format!("read hook response: {e}")))?;
        let raw = &raw[..raw.len().min(MAX_RESPONSE_BYTES)];

        if !status.is_success() {
            let message = format!(
                "hook returned HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(raw)
            );
            self.emit_error(&req.session_id, &cfg.url, &message).await;
            return Err(DialogError::Hook(message));
        }

        let hook_resp: HookResponse = serde_json::from_slice(raw)
            .map_err(|e| DialogError::Hook(format!("unmarshal hook response: {e}")))?;

        if let Some(publisher) = &self.publisher {
            let _ = publisher
                .emit(
                    EventType::HookResult,
                    &req.session_id,
                    &HookResultData {
                        hook_url: cfg.url.clone(),
                        status_code: status.as_u16(),
                        response: Some(hook_resp.data.clone()),
                    },
                )
                .await;
        }

        Ok(hook_resp)
    }

    async fn emit_error(&self, session_id: &str, url: &str, error: &str) {
        if let Some(publisher) = &self.publisher {
            let _ = publisher
                .emit(
                    EventType::HookError,
                    session_id,
                    &HookErrorData {
                        hook_url: url.to_string(),
                        error: error.to_string(),
                    },
                )
                .await;
        }
    }
}

fn hmac_sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_signature_format() {
        let sig = hmac_sign("secret", b"payload");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), 7 + 64);
        // Stable for the same inputs.
        assert_eq!(sig, hmac_sign("secret", b"payload"));
        assert_ne!(sig, hmac_sign("other", b"payload"));
    }

    #[tokio::test]
    async fn test_execute_validates_url() {
        let exec = HookExecutor::new(None, false);
        let cfg = HookConfig {
            url: "http://127.0.0.1:9/hook".into(),
            ..HookConfig::default()
        };
        let req = HookRequest {
            session_id: "s1".into(),
            state: "a".into(),
            event: "hi".into(),
            variables: HashMap::new(),
            transcript: None,
            digit: None,
        };
        assert!(matches!(
            exec.execute(&cfg, &req).await,
            Err(DialogError::HookUrl(_))
        ));
    }
}
