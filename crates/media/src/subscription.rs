//! Subscriptions
//!
//! A subscription links one published track to one subscriber peer via one
//! down track. It holds a weak back-reference to its publisher track; the
//! room's ownership chain always outlives it.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::down_track::DownTrack;
use crate::peer::Peer;
use crate::publisher_track::PublisherTrack;

/// Simulcast quality levels and their RID mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
}

impl VideoQuality {
    /// Quality → RID: low→"q", medium→"h", high→"f".
    pub fn rid(self) -> &'static str {
        match self {
            Self::Low => "q",
            Self::Medium => "h",
            Self::High => "f",
        }
    }

    pub fn from_rid(rid: &str) -> Self {
        match rid {
            "q" => Self::Low,
            "h" => Self::Medium,
            _ => Self::High,
        }
    }
}

struct SubscriptionState {
    quality: VideoQuality,
    /// SVC TID limit, -1 = all
    max_temporal: i32,
    /// SVC SID limit, -1 = all
    max_spatial: i32,
    paused: bool,
}

/// A subscriber's view of a publisher track.
pub struct Subscription {
    id: String,
    track: Weak<PublisherTrack>,
    subscriber: Arc<Peer>,
    down_track: Arc<DownTrack>,
    state: Mutex<SubscriptionState>,
    cancel: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(
        track: &Arc<PublisherTrack>,
        subscriber: Arc<Peer>,
        down_track: Arc<DownTrack>,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            track: Arc::downgrade(track),
            subscriber,
            down_track,
            state: Mutex::new(SubscriptionState {
                quality,
                max_temporal,
                max_spatial,
                paused: false,
            }),
            cancel: track.cancel_token().child_token(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn switch_layer(&self, quality: VideoQuality) {
        self.state.lock().quality = quality;
    }

    pub fn set_svc_filter(&self, max_temporal: i32, max_spatial: i32) {
        let mut state = self.state.lock();
        state.max_temporal = max_temporal;
        state.max_spatial = max_spatial;
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn quality(&self) -> VideoQuality {
        self.state.lock().quality
    }

    pub(crate) fn update(
        &self,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
        paused: bool,
    ) {
        let mut state = self.state.lock();
        state.quality = quality;
        state.max_temporal = max_temporal;
        state.max_spatial = max_spatial;
        state.paused = paused;
    }

    /// Snapshot of (paused, quality, temporal limit, spatial limit).
    pub(crate) fn forward_state(&self) -> (bool, VideoQuality, i32, i32) {
        let state = self.state.lock();
        (
            state.paused,
            state.quality,
            state.max_temporal,
            state.max_spatial,
        )
    }

    pub(crate) fn down_track(&self) -> &Arc<DownTrack> {
        &self.down_track
    }

    pub(crate) fn subscriber(&self) -> &Arc<Peer> {
        &self.subscriber
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the subscription's forwarder.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn detail(&self) -> SubscriptionDetail {
        let state = self.state.lock();
        let (track_id, publisher_peer_id) = match self.track.upgrade() {
            Some(track) => (track.id().to_string(), track.publisher_id().to_string()),
            None => (self.down_track.track_id().to_string(), String::new()),
        };
        SubscriptionDetail {
            id: self.id.clone(),
            track_id,
            publisher_peer_id,
            subscriber_peer_id: self.subscriber.id().to_string(),
            quality: state.quality,
            max_temporal_layer: state.max_temporal,
            max_spatial_layer: state.max_spatial,
            paused: state.paused,
        }
    }
}

/// Subscription metadata for the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDetail {
    pub id: String,
    pub track_id: String,
    pub publisher_peer_id: String,
    pub subscriber_peer_id: String,
    pub quality: VideoQuality,
    pub max_temporal_layer: i32,
    pub max_spatial_layer: i32,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_rid_mapping() {
        assert_eq!(VideoQuality::Low.rid(), "q");
        assert_eq!(VideoQuality::Medium.rid(), "h");
        assert_eq!(VideoQuality::High.rid(), "f");
        assert_eq!(VideoQuality::from_rid("q"), VideoQuality::Low);
        assert_eq!(VideoQuality::from_rid("unknown"), VideoQuality::High);
    }
}
