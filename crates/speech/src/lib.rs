//! Speech backend abstraction
//!
//! ASR and TTS providers live behind narrow traits, constructed through
//! name-indexed factory registries. Backend config keys are domain-scoped
//! ("deepgram_api_key", "whisper_model_path", ...) so they can share one map.

pub mod engine;
pub mod registry;

pub use engine::{AsrEngine, AsrResult, ModelInfo, Segment, TranscribeConfig, TtsEngine, Voice};
pub use registry::{asr_registry, tts_registry, Registry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("unknown backend {0:?}")]
    UnknownBackend(String),

    #[error("backend {backend:?}: {message}")]
    Backend { backend: String, message: String },

    #[error("stream closed")]
    StreamClosed,
}
