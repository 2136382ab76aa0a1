//! Configuration
//!
//! Settings load from `config/default.yaml`, an optional environment file,
//! and `VOICEBRIDGE__`-prefixed environment variables, in ascending priority.

pub mod settings;

pub use settings::{
    load_settings, DialogSettings, MediaSettings, ObservabilitySettings, ServerSettings, Settings,
    SpeechSettings, WebhookSettings,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
