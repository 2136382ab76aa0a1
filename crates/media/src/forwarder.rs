//! Per-subscription forwarders
//!
//! Simulcast subscriptions read from the layer selected by their quality
//! setting; SVC subscriptions read the sole layer and drop packets above
//! their spatial/temporal limits. Packets are forwarded in read order, one
//! forwarder task per subscription.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::publisher_track::{PublisherTrack, MAX_PACKET_SIZE};
use crate::rtp;
use crate::subscription::Subscription;
use crate::traits::{FeedbackRequest, RemoteTrack};

const PLI_INTERVAL: Duration = Duration::from_millis(500);
/// Backoff while a subscription is paused or has no readable layer.
const IDLE_WAIT: Duration = Duration::from_millis(10);

/// Limits PLI requests to at most one per interval per subscription.
pub(crate) struct PliDebouncer {
    last: Mutex<Option<Instant>>,
    interval: Duration,
}

impl PliDebouncer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            interval,
        }
    }

    pub(crate) fn should_send(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Forward from the simulcast layer selected by the subscription's quality.
/// On a layer switch, request a keyframe from the publisher (debounced).
pub(crate) async fn run_simulcast_forwarder(track: Arc<PublisherTrack>, sub: Arc<Subscription>) {
    let debounce = PliDebouncer::new(PLI_INTERVAL);
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let cancel = sub.cancel_token().clone();

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let (paused, quality, _, _) = sub.forward_state();
        if paused {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(IDLE_WAIT) => continue,
            }
        }

        // Selected layer, falling back to any available one.
        let layer = match track.layer(quality.rid()).or_else(|| track.any_layer()) {
            Some(layer) => layer,
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(IDLE_WAIT) => continue,
                }
            }
        };

        let n = tokio::select! {
            _ = cancel.cancelled() => return,
            res = layer.read(&mut buf) => match res {
                Ok(n) => n,
                Err(_) => return,
            },
        };

        sub.down_track().write(&buf[..n]);

        // A quality change since the read means the next iteration pulls from
        // a new layer; ask the publisher for a keyframe so it decodes cleanly.
        let (_, new_quality, _, _) = sub.forward_state();
        if new_quality != quality && debounce.should_send() {
            if let Some(new_layer) = track.layer(new_quality.rid()) {
                track.publisher().send_feedback(&[FeedbackRequest {
                    media_ssrc: new_layer.ssrc(),
                }]);
            }
        }
    }
}

/// Forward an SVC track, dropping packets above the subscription's
/// spatial/temporal limits. VP9 only; unknown codecs forward unfiltered.
pub(crate) async fn run_svc_forwarder(remote: Arc<dyn RemoteTrack>, sub: Arc<Subscription>) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let is_vp9 = remote.codec().mime_type.eq_ignore_ascii_case("video/vp9");
    let cancel = sub.cancel_token().clone();

    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return,
            res = remote.read(&mut buf) => match res {
                Ok(n) => n,
                Err(_) => return,
            },
        };

        let (paused, _, max_temporal, max_spatial) = sub.forward_state();
        if paused {
            continue;
        }

        if is_vp9 && (max_spatial >= 0 || max_temporal >= 0) {
            let Some(view) = rtp::parse(&buf[..n]) else {
                continue;
            };
            if let Some(layers) = rtp::parse_vp9_layers(view.payload) {
                if max_spatial >= 0 && i32::from(layers.sid) > max_spatial {
                    continue;
                }
                if max_temporal >= 0 && i32::from(layers.tid) > max_temporal {
                    continue;
                }
            }
        }

        sub.down_track().write(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pli_debounce_window() {
        let debounce = PliDebouncer::new(Duration::from_millis(50));
        assert!(debounce.should_send());
        assert!(!debounce.should_send());
        std::thread::sleep(Duration::from_millis(60));
        assert!(debounce.should_send());
    }
}
