//! Orchestration pipeline
//!
//! Binds a newly joined peer to an ASR stream, a dialog session, and a TTS
//! playback path: audio tap → transcribe → dialog events → synthesized
//! responses back into the room.

pub mod orchestrator;
pub mod services;

pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use services::{DialogControl, MediaControl, SpeechControl};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("media: {0}")]
    Media(String),

    #[error("speech: {0}")]
    Speech(String),

    #[error("dialog: {0}")]
    Dialog(String),
}
