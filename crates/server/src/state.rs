//! Application state and wiring

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use voicebridge_config::Settings;
use voicebridge_core::{MemoryQueue, Publisher, TaskPool};
use voicebridge_dialog::{Engine, HookExecutor, Loader};
use voicebridge_media::loopback::{LoopbackFactory, LoopbackSession};
use voicebridge_media::{Sfu, SfuConfig, TransportSession};
use voicebridge_pipeline::{Orchestrator, OrchestratorConfig};
use voicebridge_webhook::{Deliverer, DelivererConfig, MemoryRepository, Subscriber, WebhookRepository};

use crate::control::{LocalDialogControl, LocalMediaControl, RegistrySpeechControl};

/// Creates a transport session per joining peer. Deployments plug their
/// WebRTC stack in here; the default is the in-memory loopback transport.
pub type SessionFactory = Arc<dyn Fn() -> Arc<dyn TransportSession> + Send + Sync>;

/// Shared state across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sfu: Arc<Sfu>,
    pub engine: Arc<Engine>,
    pub publisher: Arc<Publisher>,
    pub repo: Arc<dyn WebhookRepository>,
    pub orchestrator: Arc<Orchestrator>,
    pub pool: TaskPool,
    pub session_factory: SessionFactory,
    pub cancel: CancellationToken,
}

impl AppState {
    /// Wire every component from settings: the in-memory queue feeding the
    /// webhook subscriber, the SFU over the loopback transport, the dialog
    /// engine with its loader, reaper and hook executor, and the
    /// orchestrator over the in-process service seams.
    pub fn build(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let pool = TaskPool::new(settings.server.worker_pool_size);
        let cancel = CancellationToken::new();

        let (queue, queue_rx) = MemoryQueue::new(1024);
        let publisher = Arc::new(Publisher::new(Arc::new(queue), "voicebridge", "events.session"));

        let factory = LoopbackFactory::new();
        let sfu = Arc::new(Sfu::new(
            SfuConfig {
                simulcast_enabled: settings.media.simulcast_enabled,
                svc_enabled: settings.media.svc_enabled,
                speaker_interval_ms: settings.media.speaker_interval_ms,
                speaker_threshold: settings.media.speaker_threshold,
                default_max_peers: settings.media.default_max_peers,
                default_max_publishers: settings.media.default_max_publishers,
                default_auto_subscribe_audio: settings.media.auto_subscribe_audio,
                e2ee_default_required: settings.media.e2ee_default_required,
                ..SfuConfig::default()
            },
            pool.clone(),
            factory,
            Some(Arc::clone(&publisher)),
        ));

        let loader = Loader::new(&settings.dialog.dialog_dir);
        match loader.load_all() {
            Ok(count) => tracing::info!(dialogs = count, "dialogs loaded"),
            Err(err) => tracing::warn!(error = %err, "dialog load failed; starting empty"),
        }
        if settings.dialog.hot_reload {
            loader.watch(cancel.clone());
        }

        let hooks = Arc::new(HookExecutor::new(Some(Arc::clone(&publisher)), false));
        let engine = Engine::new(
            loader,
            Some(hooks),
            Some(Arc::clone(&publisher)),
            pool.clone(),
            None,
        );
        engine.start_reaper(cancel.clone());

        let repo: Arc<dyn WebhookRepository> = Arc::new(MemoryRepository::new());
        let deliverer = Arc::new(Deliverer::new(
            Arc::clone(&repo),
            DelivererConfig {
                max_retries: settings.webhook.max_retries,
                timeout: std::time::Duration::from_secs(settings.webhook.timeout_sec),
                backoff_initial: std::time::Duration::from_secs(
                    settings.webhook.backoff_initial_sec,
                ),
                backoff_max: std::time::Duration::from_secs(settings.webhook.backoff_max_sec),
                breaker_failure_threshold: settings.webhook.cb_failure_threshold,
                breaker_reset_timeout: std::time::Duration::from_secs(
                    settings.webhook.cb_reset_timeout_sec,
                ),
                allow_private_urls: false,
            },
        ));
        let subscriber = Subscriber::new(
            Arc::clone(&repo),
            deliverer,
            pool.clone(),
            cancel.clone(),
        );
        subscriber.run(queue_rx);

        let speech_config: HashMap<String, String> = HashMap::from([
            (
                "whisper_model_path".to_string(),
                settings.speech.whisper_model_path.clone(),
            ),
            (
                "piper_model_path".to_string(),
                settings.speech.piper_model_path.clone(),
            ),
            (
                "deepgram_api_key".to_string(),
                settings.speech.deepgram_api_key.clone(),
            ),
            (
                "elevenlabs_api_key".to_string(),
                settings.speech.elevenlabs_api_key.clone(),
            ),
            (
                "openai_api_key".to_string(),
                settings.speech.openai_api_key.clone(),
            ),
        ]);

        let orchestrator = Orchestrator::new(
            LocalMediaControl::new(Arc::clone(&sfu), Some(Arc::clone(&publisher))) as _,
            RegistrySpeechControl::new(
                settings.speech.default_asr_backend.clone(),
                settings.speech.default_tts_backend.clone(),
                speech_config,
            ) as _,
            LocalDialogControl::new(Arc::clone(&engine)) as _,
            OrchestratorConfig {
                default_dialog: settings.dialog.default_dialog.clone(),
                asr_backend: settings.speech.default_asr_backend.clone(),
                asr_model: settings.speech.asr_model.clone(),
                language: settings.speech.language.clone(),
            },
            pool.clone(),
        );

        let session_factory: SessionFactory = Arc::new(|| LoopbackSession::new() as _);

        Self {
            settings,
            sfu,
            engine,
            publisher,
            repo,
            orchestrator,
            pool,
            session_factory,
            cancel,
        }
    }
}
