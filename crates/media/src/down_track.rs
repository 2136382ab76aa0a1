//! Forwarded track toward a subscriber

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::LocalTrack;

/// A track forwarded from a publisher to one subscriber.
pub struct DownTrack {
    local: Arc<dyn LocalTrack>,
    source_peer_id: String,
    track_id: String,
    rid: Option<String>,
    muted: AtomicBool,
}

impl DownTrack {
    pub fn new(local: Arc<dyn LocalTrack>, source_peer_id: impl Into<String>) -> Self {
        let track_id = local.id();
        let rid = local.rid();
        Self {
            local,
            source_peer_id: source_peer_id.into(),
            track_id,
            rid,
            muted: AtomicBool::new(false),
        }
    }

    /// Write RTP data, respecting the muted state. Write errors are dropped;
    /// a broken downstream is detected by the subscriber's own transport.
    pub fn write(&self, packet: &[u8]) {
        if self.muted.load(Ordering::Relaxed) {
            return;
        }
        let _ = self.local.write(packet);
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn local_track(&self) -> Arc<dyn LocalTrack> {
        Arc::clone(&self.local)
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn source_peer_id(&self) -> &str {
        &self.source_peer_id
    }

    pub fn rid(&self) -> Option<&str> {
        self.rid.as_deref()
    }
}
