//! Backend factory registries
//!
//! Backends register a named factory at startup; steady state is read-only.
//! The process-wide ASR/TTS registries follow initialize-once-before-serving
//! semantics.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::engine::{AsrEngine, TtsEngine};
use crate::SpeechError;

/// Creates an instance of `T` from a config map.
pub type Factory<T> = Arc<dyn Fn(&HashMap<String, String>) -> Result<T, SpeechError> + Send + Sync>;

/// Named factories for creating instances of `T`.
pub struct Registry<T> {
    factories: RwLock<HashMap<String, Factory<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, factory: Factory<T>) {
        self.factories.write().insert(name.into(), factory);
    }

    /// Instantiate `T` using the named factory.
    pub fn create(&self, name: &str, config: &HashMap<String, String>) -> Result<T, SpeechError> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SpeechError::UnknownBackend(name.to_string()))?;
        factory(config)
    }

    pub fn has(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn clear(&self) {
        self.factories.write().clear();
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

static ASR_REGISTRY: Lazy<Registry<Arc<dyn AsrEngine>>> = Lazy::new(Registry::new);
static TTS_REGISTRY: Lazy<Registry<Arc<dyn TtsEngine>>> = Lazy::new(Registry::new);

/// The process-wide ASR backend registry.
pub fn asr_registry() -> &'static Registry<Arc<dyn AsrEngine>> {
    &ASR_REGISTRY
}

/// The process-wide TTS backend registry.
pub fn tts_registry() -> &'static Registry<Arc<dyn TtsEngine>> {
    &TTS_REGISTRY
}
