//! Per-peer orchestration
//!
//! One orchestration runs per (room, peer) pair, triggered by the media
//! layer's peer-joined callback. It runs on the service-level context, never
//! the join request's, so it outlives the RPC that started it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicebridge_core::TaskPool;
use voicebridge_dialog::{Action, ActionType, DialogTurn};
use voicebridge_speech::TranscribeConfig;

use crate::services::{DialogControl, MediaControl, SpeechControl};

const TTS_CHANNEL: usize = 32;

/// Orchestrator settings, sourced from the service configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_dialog: String,
    pub asr_backend: String,
    pub asr_model: String,
    pub language: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_dialog: "example".into(),
            asr_backend: String::new(),
            asr_model: String::new(),
            language: String::new(),
        }
    }
}

/// Wires media, speech, and dialog together for live sessions.
pub struct Orchestrator {
    media: Arc<dyn MediaControl>,
    speech: Arc<dyn SpeechControl>,
    dialog: Arc<dyn DialogControl>,
    config: OrchestratorConfig,
    pool: TaskPool,
}

impl Orchestrator {
    pub fn new(
        media: Arc<dyn MediaControl>,
        speech: Arc<dyn SpeechControl>,
        dialog: Arc<dyn DialogControl>,
        config: OrchestratorConfig,
        pool: TaskPool,
    ) -> Arc<Self> {
        Arc::new(Self {
            media,
            speech,
            dialog,
            config,
            pool,
        })
    }

    /// Run the pipeline for a peer that just joined a room. Returns when the
    /// dialog terminates or the audio stream ends.
    pub async fn handle_peer_joined(&self, room_id: &str, peer_id: &str, dialog_name: &str) {
        let dialog_name = if dialog_name.is_empty() {
            self.config.default_dialog.as_str()
        } else {
            dialog_name
        };
        let session_id = format!("{room_id}-{peer_id}");

        tracing::info!(
            room_id = %room_id,
            peer_id = %peer_id,
            dialog = %dialog_name,
            "orchestrator: starting pipeline"
        );

        self.run_pipeline(room_id, peer_id, dialog_name, &session_id)
            .await;

        // Dialog cleanup always runs, whatever ended the pipeline.
        if let Err(err) = self.dialog.end_dialog(&session_id).await {
            tracing::debug!(session_id = %session_id, error = %err, "end dialog");
        }
    }

    async fn run_pipeline(&self, room_id: &str, peer_id: &str, dialog_name: &str, session_id: &str) {
        // 1. Tap the peer's audio.
        let mut audio_rx = match self.media.subscribe_audio(room_id, peer_id).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(error = %err, "orchestrator: subscribe audio failed");
                return;
            }
        };

        // 2. Open the transcription stream. The SFU taps deliver Opus at the
        // room clock; the speech service decodes downstream.
        let (asr_audio_tx, asr_audio_rx) = mpsc::channel(TTS_CHANNEL);
        let transcribe_config = TranscribeConfig {
            session_id: session_id.to_string(),
            backend: self.config.asr_backend.clone(),
            model: self.config.asr_model.clone(),
            language: self.config.language.clone(),
            sample_rate: 48_000,
            codec: "audio/opus".into(),
            interim_results: true,
        };
        let mut results_rx = match self.speech.transcribe(transcribe_config, asr_audio_rx).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(error = %err, "orchestrator: transcribe failed");
                return;
            }
        };

        // 3. Start the dialog and play its opening actions.
        let start = match self.dialog.start_dialog(session_id, dialog_name).await {
            Ok(turn) => turn,
            Err(err) => {
                tracing::error!(error = %err, "orchestrator: start dialog failed");
                return;
            }
        };
        self.execute_actions(room_id, session_id, &start.actions).await;

        // 4. Pipe tapped audio into the transcriber. Pipe EOF cancels the
        // main loop through the shared token.
        let pipe_cancel = CancellationToken::new();
        {
            let pipe_cancel = pipe_cancel.clone();
            self.pool.spawn(async move {
                while let Some(frame) = audio_rx.recv().await {
                    if asr_audio_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                pipe_cancel.cancel();
            });
        }

        // 5. Main loop: final transcripts drive the dialog.
        loop {
            let result = tokio::select! {
                _ = pipe_cancel.cancelled() => {
                    tracing::info!(session_id = %session_id, "orchestrator: audio pipe ended");
                    return;
                }
                result = results_rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            if !result.is_final {
                continue;
            }

            let turn = match self.dialog.send_event(session_id, "speech", &result.text).await {
                Ok(turn) => turn,
                Err(err) => {
                    tracing::error!(session_id = %session_id, error = %err, "orchestrator: send event failed");
                    continue;
                }
            };

            self.execute_actions(room_id, session_id, &turn.actions).await;

            if turn.terminal {
                let _ = self.media.leave_room(room_id, peer_id).await;
                break;
            }
        }
    }

    /// Execute action directives returned by the dialog engine.
    pub async fn execute_actions(&self, room_id: &str, session_id: &str, actions: &[Action]) {
        for action in actions {
            match action.action_type {
                ActionType::PlayTts => {
                    let Some(text) = action.param("text").filter(|t| !t.is_empty()) else {
                        continue;
                    };
                    self.play_tts(room_id, text).await;
                }
                ActionType::Hangup => {
                    tracing::info!(session_id = %session_id, "orchestrator: hangup action");
                    return;
                }
                other => {
                    tracing::debug!(
                        session_id = %session_id,
                        action = other.as_str(),
                        "orchestrator: unhandled action"
                    );
                }
            }
        }
    }

    /// Synthesize text and stream the audio into the room.
    async fn play_tts(&self, room_id: &str, text: &str) {
        let mut synth_rx = match self.speech.synthesize(text).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!(error = %err, "orchestrator: synthesize failed");
                return;
            }
        };

        let (play_tx, play_rx) = mpsc::channel(TTS_CHANNEL);
        let forward = async move {
            while let Some(frame) = synth_rx.recv().await {
                if play_tx.send(frame).await.is_err() {
                    break;
                }
            }
        };

        let (_, played) = tokio::join!(forward, self.media.play_audio(room_id, play_rx));
        if let Err(err) = played {
            tracing::error!(error = %err, "orchestrator: play audio failed");
        }
    }

    /// The dialog result for a join with no pipeline (used by tests and the
    /// server's direct-start path).
    pub fn default_dialog(&self) -> &str {
        &self.config.default_dialog
    }

    pub fn start_for_peer(self: &Arc<Self>, room_id: &str, peer_id: &str, dialog_name: &str) {
        let orchestrator = Arc::clone(self);
        let room_id = room_id.to_string();
        let peer_id = peer_id.to_string();
        let dialog_name = dialog_name.to_string();
        self.pool.spawn(async move {
            orchestrator
                .handle_peer_joined(&room_id, &peer_id, &dialog_name)
                .await;
        });
    }
}
