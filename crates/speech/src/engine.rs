//! ASR and TTS engine traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use voicebridge_core::AudioFrame;

use crate::SpeechError;

/// A timed piece of a transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start_ms: u32,
    pub end_ms: u32,
    pub confidence: f32,
}

/// A speech-to-text result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrResult {
    pub text: String,
    pub confidence: f32,
    pub language: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

impl AsrResult {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 0.0,
            language: String::new(),
            is_final: false,
            segments: Vec::new(),
        }
    }

    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            language: String::new(),
            is_final: true,
            segments: Vec::new(),
        }
    }
}

/// An available model for a backend.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub is_default: bool,
}

/// An available TTS voice.
#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Configuration for a transcription stream. This is the first frame of the
/// bidi RPC in the wire protocol; in-process it is a plain argument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscribeConfig {
    pub session_id: String,
    pub backend: String,
    pub model: String,
    pub language: String,
    pub sample_rate: u32,
    pub codec: String,
    pub interim_results: bool,
}

/// Streaming speech-to-text.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    /// Transcribe an audio stream. Results (interim and final) arrive on the
    /// returned channel until the audio channel closes.
    async fn transcribe(
        &self,
        config: TranscribeConfig,
        audio: mpsc::Receiver<AudioFrame>,
    ) -> Result<mpsc::Receiver<AsrResult>, SpeechError>;

    fn models(&self) -> Vec<ModelInfo>;

    async fn close(&self);
}

/// Streaming text-to-speech.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Synthesize text into a stream of encoded audio frames.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
    ) -> Result<mpsc::Receiver<AudioFrame>, SpeechError>;

    fn voices(&self) -> Vec<Voice>;

    fn models(&self) -> Vec<ModelInfo>;

    async fn close(&self);
}
