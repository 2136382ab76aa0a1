//! Settings sections

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub media: MediaSettings,

    #[serde(default)]
    pub speech: SpeechSettings,

    #[serde(default)]
    pub dialog: DialogSettings,

    #[serde(default)]
    pub webhook: WebhookSettings,

    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "webhook.max_retries".into(),
                message: "at least one delivery attempt is required".into(),
            });
        }
        if self.webhook.backoff_initial_sec > self.webhook.backoff_max_sec {
            return Err(ConfigError::InvalidValue {
                field: "webhook.backoff_initial_sec".into(),
                message: "initial backoff exceeds the maximum".into(),
            });
        }
        if self.media.speaker_threshold > 127 {
            return Err(ConfigError::InvalidValue {
                field: "media.speaker_threshold".into(),
                message: "RFC 6464 levels range 0..=127".into(),
            });
        }
        Ok(())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Size of the shared worker pool. Deployments should keep this above
    /// expected peak concurrency.
    #[serde(default = "default_worker_pool")]
    pub worker_pool_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_worker_pool() -> usize {
    256
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_pool_size: default_worker_pool(),
        }
    }
}

/// SFU settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_max_rooms")]
    pub max_rooms_per_node: usize,

    #[serde(default = "default_max_peers")]
    pub default_max_peers: usize,

    #[serde(default = "default_max_publishers")]
    pub default_max_publishers: usize,

    #[serde(default = "default_true")]
    pub simulcast_enabled: bool,

    #[serde(default = "default_true")]
    pub svc_enabled: bool,

    #[serde(default = "default_speaker_interval")]
    pub speaker_interval_ms: u64,

    /// RFC 6464 loudness threshold: at or below counts as speaking.
    #[serde(default = "default_speaker_threshold")]
    pub speaker_threshold: u8,

    #[serde(default)]
    pub e2ee_default_required: bool,

    #[serde(default = "default_true")]
    pub auto_subscribe_audio: bool,
}

fn default_max_rooms() -> usize {
    100
}
fn default_max_peers() -> usize {
    1000
}
fn default_max_publishers() -> usize {
    100
}
fn default_speaker_interval() -> u64 {
    500
}
fn default_speaker_threshold() -> u8 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            max_rooms_per_node: default_max_rooms(),
            default_max_peers: default_max_peers(),
            default_max_publishers: default_max_publishers(),
            simulcast_enabled: true,
            svc_enabled: true,
            speaker_interval_ms: default_speaker_interval(),
            speaker_threshold: default_speaker_threshold(),
            e2ee_default_required: false,
            auto_subscribe_audio: true,
        }
    }
}

/// Speech backend settings. Backend-specific keys are domain-scoped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_asr_backend")]
    pub default_asr_backend: String,

    #[serde(default = "default_tts_backend")]
    pub default_tts_backend: String,

    #[serde(default)]
    pub asr_model: String,

    #[serde(default)]
    pub language: String,

    #[serde(default = "default_whisper_model")]
    pub whisper_model_path: String,

    #[serde(default = "default_piper_model")]
    pub piper_model_path: String,

    #[serde(default)]
    pub deepgram_api_key: String,

    #[serde(default)]
    pub elevenlabs_api_key: String,

    #[serde(default)]
    pub openai_api_key: String,
}

fn default_asr_backend() -> String {
    "whisper".to_string()
}
fn default_tts_backend() -> String {
    "piper".to_string()
}
fn default_whisper_model() -> String {
    "./models/ggml-base.bin".to_string()
}
fn default_piper_model() -> String {
    "./models/en_US-amy-medium.onnx".to_string()
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            default_asr_backend: default_asr_backend(),
            default_tts_backend: default_tts_backend(),
            asr_model: String::new(),
            language: String::new(),
            whisper_model_path: default_whisper_model(),
            piper_model_path: default_piper_model(),
            deepgram_api_key: String::new(),
            elevenlabs_api_key: String::new(),
            openai_api_key: String::new(),
        }
    }
}

/// Dialog engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogSettings {
    #[serde(default = "default_dialog_dir")]
    pub dialog_dir: String,

    #[serde(default = "default_dialog_name")]
    pub default_dialog: String,

    #[serde(default = "default_true")]
    pub hot_reload: bool,
}

fn default_dialog_dir() -> String {
    "./dialogs".to_string()
}
fn default_dialog_name() -> String {
    "example".to_string()
}

impl Default for DialogSettings {
    fn default() -> Self {
        Self {
            dialog_dir: default_dialog_dir(),
            default_dialog: default_dialog_name(),
            hot_reload: true,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default = "default_webhook_retries")]
    pub max_retries: u32,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_sec: u64,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_sec: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_sec: u64,

    #[serde(default = "default_cb_threshold")]
    pub cb_failure_threshold: u32,

    #[serde(default = "default_cb_reset")]
    pub cb_reset_timeout_sec: u64,
}

fn default_webhook_retries() -> u32 {
    5
}
fn default_webhook_timeout() -> u64 {
    10
}
fn default_backoff_initial() -> u64 {
    1
}
fn default_backoff_max() -> u64 {
    300
}
fn default_cb_threshold() -> u32 {
    5
}
fn default_cb_reset() -> u64 {
    60
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            max_retries: default_webhook_retries(),
            timeout_sec: default_webhook_timeout(),
            backoff_initial_sec: default_backoff_initial(),
            backoff_max_sec: default_backoff_max(),
            cb_failure_threshold: default_cb_threshold(),
            cb_reset_timeout_sec: default_cb_reset(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`VOICEBRIDGE__` prefix, `__` separator)
/// 2. `config/{env}.yaml` when an environment name is given
/// 3. `config/default.yaml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICEBRIDGE")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.media.speaker_interval_ms, 500);
        assert_eq!(settings.media.speaker_threshold, 30);
        assert_eq!(settings.webhook.max_retries, 5);
        assert_eq!(settings.dialog.default_dialog, "example");
        settings.validate().unwrap();
    }

    #[test]
    fn test_validation_catches_bad_values() {
        let mut settings = Settings::default();
        settings.webhook.max_retries = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.webhook.backoff_initial_sec = 600;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.media.speaker_threshold = 200;
        assert!(settings.validate().is_err());
    }
}
