//! Service seams the orchestrator drives
//!
//! In the polylith deployment these are RPC clients; in the monolith they
//! wrap the in-process components. Streams are plain channels: receiving
//! ends for server-streaming calls, sending ends for client-streaming ones.

use async_trait::async_trait;

use tokio::sync::mpsc;

use voicebridge_core::AudioFrame;
use voicebridge_dialog::DialogTurn;
use voicebridge_speech::{AsrResult, TranscribeConfig};

use crate::PipelineError;

/// Media-service operations the orchestrator needs.
#[async_trait]
pub trait MediaControl: Send + Sync {
    /// Tap a peer's audio in a room. Frames arrive until the peer leaves.
    async fn subscribe_audio(
        &self,
        room_id: &str,
        peer_id: &str,
    ) -> Result<mpsc::Receiver<AudioFrame>, PipelineError>;

    /// Play an audio stream into a room (client-streaming).
    async fn play_audio(
        &self,
        room_id: &str,
        frames: mpsc::Receiver<AudioFrame>,
    ) -> Result<(), PipelineError>;

    async fn leave_room(&self, room_id: &str, peer_id: &str) -> Result<(), PipelineError>;
}

/// Speech-service operations the orchestrator needs.
#[async_trait]
pub trait SpeechControl: Send + Sync {
    /// Open a transcription stream: the config frame comes first, audio
    /// frames follow on the channel, results stream back.
    async fn transcribe(
        &self,
        config: TranscribeConfig,
        audio: mpsc::Receiver<AudioFrame>,
    ) -> Result<mpsc::Receiver<AsrResult>, PipelineError>;

    /// Synthesize text into a stream of audio frames.
    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<AudioFrame>, PipelineError>;
}

/// Dialog-service operations the orchestrator needs.
#[async_trait]
pub trait DialogControl: Send + Sync {
    async fn start_dialog(
        &self,
        session_id: &str,
        dialog_name: &str,
    ) -> Result<DialogTurn, PipelineError>;

    async fn send_event(
        &self,
        session_id: &str,
        event_type: &str,
        data: &str,
    ) -> Result<DialogTurn, PipelineError>;

    async fn end_dialog(&self, session_id: &str) -> Result<(), PipelineError>;
}
