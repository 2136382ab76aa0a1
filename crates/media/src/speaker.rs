//! Active speaker detection
//!
//! Tracks RFC 6464 audio levels per peer and periodically reports the active
//! speaker set to registered listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicebridge_core::TaskPool;

const DEFAULT_THRESHOLD: u8 = 30;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
/// A peer silent for longer than this is excluded from the speaker set.
const STALE_AFTER: Duration = Duration::from_secs(2);
const LISTENER_BUFFER: usize = 16;

/// A single speaker's audio state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSpeakerInfo {
    pub peer_id: String,
    /// RFC 6464 loudness: 0 = loudest, 127 = silence
    pub audio_level: u8,
    pub voice_activity: bool,
}

struct SpeakerState {
    level: u8,
    voice_activity: bool,
    last_seen: Instant,
}

/// Tracks audio levels from peers and periodically reports active speakers.
pub struct SpeakerDetector {
    levels: RwLock<HashMap<String, SpeakerState>>,
    listeners: RwLock<HashMap<String, mpsc::Sender<Vec<ActiveSpeakerInfo>>>>,
    threshold: u8,
    interval: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
    pool: TaskPool,
}

impl SpeakerDetector {
    pub fn new(threshold: u8, interval: Duration, pool: TaskPool) -> Arc<Self> {
        let threshold = if threshold == 0 {
            DEFAULT_THRESHOLD
        } else {
            threshold
        };
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        Arc::new(Self {
            levels: RwLock::new(HashMap::new()),
            listeners: RwLock::new(HashMap::new()),
            threshold,
            interval,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            pool,
        })
    }

    /// Begin the periodic reporting ticker. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let detector = Arc::clone(self);
        self.pool.spawn(async move {
            let mut ticker = tokio::time::interval(detector.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = detector.cancel.cancelled() => return,
                    _ = ticker.tick() => detector.report(),
                }
            }
        });
    }

    /// Record a new audio level sample for a peer.
    pub fn update_level(&self, peer_id: &str, level: u8, voice_activity: bool) {
        let mut levels = self.levels.write();
        let state = levels.entry(peer_id.to_string()).or_insert(SpeakerState {
            level: 127,
            voice_activity: false,
            last_seen: Instant::now(),
        });
        state.level = level;
        state.voice_activity = voice_activity;
        state.last_seen = Instant::now();
    }

    /// Register a listener. Updates that would block are dropped.
    pub fn add_listener(&self, id: impl Into<String>) -> mpsc::Receiver<Vec<ActiveSpeakerInfo>> {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        self.listeners.write().insert(id.into(), tx);
        rx
    }

    pub fn remove_listener(&self, id: &str) {
        self.listeners.write().remove(id);
    }

    /// The current active speaker set, loudest first.
    pub fn active_speakers(&self) -> Vec<ActiveSpeakerInfo> {
        let levels = self.levels.read();
        self.active_speakers_locked(&levels)
    }

    fn active_speakers_locked(
        &self,
        levels: &HashMap<String, SpeakerState>,
    ) -> Vec<ActiveSpeakerInfo> {
        let now = Instant::now();
        let mut speakers: Vec<ActiveSpeakerInfo> = levels
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) <= STALE_AFTER)
            .filter(|(_, s)| s.level <= self.threshold || s.voice_activity)
            .map(|(peer_id, s)| ActiveSpeakerInfo {
                peer_id: peer_id.clone(),
                audio_level: s.level,
                voice_activity: s.voice_activity,
            })
            .collect();
        // Lower level = louder.
        speakers.sort_by_key(|s| s.audio_level);
        speakers
    }

    fn report(&self) {
        let speakers = {
            let levels = self.levels.read();
            self.active_speakers_locked(&levels)
        };
        let listeners: Vec<(String, mpsc::Sender<Vec<ActiveSpeakerInfo>>)> = {
            let listeners = self.listeners.read();
            listeners
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };
        for (id, tx) in listeners {
            if tx.try_send(speakers.clone()).is_err() {
                tracing::debug!(listener = %id, "speaker update dropped");
            }
        }
    }

    pub fn remove_peer(&self, peer_id: &str) {
        self.levels.write().remove(peer_id);
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> Arc<SpeakerDetector> {
        SpeakerDetector::new(30, Duration::from_millis(20), TaskPool::new(4))
    }

    #[tokio::test]
    async fn test_active_speakers_sorted_by_loudness() {
        let det = detector();
        det.update_level("quiet", 40, true); // above threshold but VAD
        det.update_level("loud", 5, false);
        det.update_level("silent", 120, false);

        let speakers = det.active_speakers();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers[0].peer_id, "loud");
        assert_eq!(speakers[1].peer_id, "quiet");
    }

    #[tokio::test]
    async fn test_remove_peer_clears_state() {
        let det = detector();
        det.update_level("a", 0, true);
        det.remove_peer("a");
        assert!(det.active_speakers().is_empty());
    }

    #[tokio::test]
    async fn test_ticker_reports_to_listener() {
        let det = detector();
        let mut rx = det.add_listener("test");
        det.start();
        det.update_level("a", 10, false);

        let update = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("ticker should fire")
            .expect("listener channel open");
        assert_eq!(update.len(), 1);
        assert_eq!(update[0].peer_id, "a");
        det.close();
    }
}
