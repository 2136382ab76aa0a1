//! In-process service implementations for the orchestrator
//!
//! The monolith wires the orchestrator straight to the local components; the
//! polylith swaps these for RPC clients behind the same traits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicebridge_core::events::CallTerminatedData;
use voicebridge_core::{AudioFrame, EventType, Publisher};
use voicebridge_dialog::{DialogTurn, Engine};
use voicebridge_media::Sfu;
use voicebridge_pipeline::{DialogControl, MediaControl, PipelineError, SpeechControl};
use voicebridge_speech::{asr_registry, tts_registry, AsrResult, TranscribeConfig};

const TAP_CHANNEL: usize = 256;

fn tap_id(room_id: &str, peer_id: &str) -> String {
    format!("orchestrator:{room_id}:{peer_id}")
}

/// Media control backed by the local SFU.
pub struct LocalMediaControl {
    sfu: Arc<Sfu>,
    publisher: Option<Arc<Publisher>>,
}

impl LocalMediaControl {
    pub fn new(sfu: Arc<Sfu>, publisher: Option<Arc<Publisher>>) -> Arc<Self> {
        Arc::new(Self { sfu, publisher })
    }
}

#[async_trait]
impl MediaControl for LocalMediaControl {
    async fn subscribe_audio(
        &self,
        room_id: &str,
        peer_id: &str,
    ) -> Result<mpsc::Receiver<AudioFrame>, PipelineError> {
        let room = self
            .sfu
            .get_room(room_id)
            .ok_or_else(|| PipelineError::Media(format!("room {room_id:?} not found")))?;

        let (tx, rx) = mpsc::channel(TAP_CHANNEL);
        let wanted = peer_id.to_string();
        room.add_audio_tap(
            tap_id(room_id, peer_id),
            Arc::new(move |pid: &str, payload: &[u8], codec: &str| {
                if pid != wanted {
                    return;
                }
                let frame = AudioFrame::new(payload.to_vec(), codec, 48_000, 2);
                // Best effort: a stalled consumer drops frames, never the SFU.
                let _ = tx.try_send(frame);
            }),
        );
        Ok(rx)
    }

    async fn play_audio(
        &self,
        room_id: &str,
        mut frames: mpsc::Receiver<AudioFrame>,
    ) -> Result<(), PipelineError> {
        let room = self
            .sfu
            .get_room(room_id)
            .ok_or_else(|| PipelineError::Media(format!("room {room_id:?} not found")))?;

        while let Some(frame) = frames.recv().await {
            room.inject_audio("tts", &frame.data, &frame.codec);
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: &str, peer_id: &str) -> Result<(), PipelineError> {
        let room = self
            .sfu
            .get_room(room_id)
            .ok_or_else(|| PipelineError::Media(format!("room {room_id:?} not found")))?;

        room.remove_audio_tap(&tap_id(room_id, peer_id));
        if room.get_peer(peer_id).is_some() {
            room.remove_peer(peer_id).await;
            if let Some(publisher) = &self.publisher {
                let _ = publisher
                    .emit(
                        EventType::CallTerminated,
                        &format!("{room_id}-{peer_id}"),
                        &CallTerminatedData {
                            reason: "dialog terminated".into(),
                            duration_ms: 0,
                        },
                    )
                    .await;
            }
        }
        Ok(())
    }
}

/// Speech control resolving backends from the process-wide registries.
pub struct RegistrySpeechControl {
    asr_backend: String,
    tts_backend: String,
    config: std::collections::HashMap<String, String>,
}

impl RegistrySpeechControl {
    pub fn new(
        asr_backend: impl Into<String>,
        tts_backend: impl Into<String>,
        config: std::collections::HashMap<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            asr_backend: asr_backend.into(),
            tts_backend: tts_backend.into(),
            config,
        })
    }
}

#[async_trait]
impl SpeechControl for RegistrySpeechControl {
    async fn transcribe(
        &self,
        config: TranscribeConfig,
        audio: mpsc::Receiver<AudioFrame>,
    ) -> Result<mpsc::Receiver<AsrResult>, PipelineError> {
        let backend = if config.backend.is_empty() {
            self.asr_backend.clone()
        } else {
            config.backend.clone()
        };
        let engine = asr_registry()
            .create(&backend, &self.config)
            .map_err(|err| PipelineError::Speech(err.to_string()))?;
        engine
            .transcribe(config, audio)
            .await
            .map_err(|err| PipelineError::Speech(err.to_string()))
    }

    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<AudioFrame>, PipelineError> {
        let engine = tts_registry()
            .create(&self.tts_backend, &self.config)
            .map_err(|err| PipelineError::Speech(err.to_string()))?;
        engine
            .synthesize(text, "")
            .await
            .map_err(|err| PipelineError::Speech(err.to_string()))
    }
}

/// Dialog control backed by the local engine.
pub struct LocalDialogControl {
    engine: Arc<Engine>,
}

impl LocalDialogControl {
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

#[async_trait]
impl DialogControl for LocalDialogControl {
    async fn start_dialog(
        &self,
        session_id: &str,
        dialog_name: &str,
    ) -> Result<DialogTurn, PipelineError> {
        self.engine
            .start_dialog(session_id, dialog_name, None, Default::default())
            .await
            .map_err(|err| PipelineError::Dialog(err.to_string()))
    }

    async fn send_event(
        &self,
        session_id: &str,
        event_type: &str,
        data: &str,
    ) -> Result<DialogTurn, PipelineError> {
        self.engine
            .send_event(session_id, event_type, data)
            .await
            .map_err(|err| PipelineError::Dialog(err.to_string()))
    }

    async fn end_dialog(&self, session_id: &str) -> Result<(), PipelineError> {
        self.engine
            .end_dialog(session_id)
            .await
            .map_err(|err| PipelineError::Dialog(err.to_string()))
    }
}
