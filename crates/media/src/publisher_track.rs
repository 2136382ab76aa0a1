//! Published tracks
//!
//! Groups simulcast layers under one logical track, runs the RTP reader per
//! layer, and owns the subscriptions fanning the track out to peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use voicebridge_core::TaskPool;

use crate::down_track::DownTrack;
use crate::encryption::EncryptionInfo;
use crate::forwarder;
use crate::peer::Peer;
use crate::room::AudioTap;
use crate::rtp;
use crate::speaker::SpeakerDetector;
use crate::subscription::{Subscription, VideoQuality};
use crate::traits::{RemoteTrack, TrackFactory, TrackKind};
use crate::MediaError;

/// Maximum RTP packet size read from a layer.
pub(crate) const MAX_PACKET_SIZE: usize = 1500;

/// Track metadata for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct PublisherTrackInfo {
    pub id: String,
    pub peer_id: String,
    pub kind: TrackKind,
    pub mime_type: String,
    pub simulcast: bool,
    pub svc: bool,
    /// Available RIDs ("" for the sole non-simulcast layer)
    pub layers: Vec<String>,
    pub encryption: Option<EncryptionInfo>,
}

/// A logical published media stream owned by a peer.
pub struct PublisherTrack {
    id: String,
    publisher: Arc<Peer>,
    publisher_id: String,
    kind: TrackKind,
    mime_type: String,
    simulcast: AtomicBool,
    svc: AtomicBool,
    layers: RwLock<HashMap<String, Arc<dyn RemoteTrack>>>,
    subscribers: RwLock<HashMap<String, Arc<Subscription>>>,
    audio_taps: RwLock<HashMap<String, AudioTap>>,
    encryption: Option<EncryptionInfo>,
    cancel: CancellationToken,
    pool: TaskPool,
    speaker: Option<Arc<SpeakerDetector>>,
    factory: Arc<dyn TrackFactory>,
    audio_level_ext_id: u8,
}

impl std::fmt::Debug for PublisherTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherTrack")
            .field("id", &self.id)
            .finish()
    }
}

impl PublisherTrack {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        publisher: Arc<Peer>,
        remote: Arc<dyn RemoteTrack>,
        pool: TaskPool,
        speaker: Option<Arc<SpeakerDetector>>,
        encryption: Option<EncryptionInfo>,
        factory: Arc<dyn TrackFactory>,
        audio_level_ext_id: u8,
    ) -> Arc<Self> {
        let rid = remote.rid();
        let track = Arc::new(Self {
            id: remote.id(),
            publisher_id: publisher.id().to_string(),
            kind: remote.kind(),
            mime_type: remote.codec().mime_type,
            simulcast: AtomicBool::new(!rid.is_empty()),
            svc: AtomicBool::new(false),
            layers: RwLock::new(HashMap::from([(rid.clone(), remote)])),
            subscribers: RwLock::new(HashMap::new()),
            audio_taps: RwLock::new(HashMap::new()),
            encryption,
            cancel: publisher.cancel_token().child_token(),
            pool,
            speaker,
            factory,
            publisher,
            audio_level_ext_id,
        });

        track.start_layer_reader(rid);
        track
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn publisher_id(&self) -> &str {
        &self.publisher_id
    }

    pub fn is_simulcast(&self) -> bool {
        self.simulcast.load(Ordering::Relaxed)
    }

    pub fn is_svc(&self) -> bool {
        self.svc.load(Ordering::Relaxed)
    }

    pub fn set_svc(&self, svc: bool) {
        self.svc.store(svc, Ordering::Relaxed);
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn publisher(&self) -> &Arc<Peer> {
        &self.publisher
    }

    pub(crate) fn layer(&self, rid: &str) -> Option<Arc<dyn RemoteTrack>> {
        self.layers.read().get(rid).cloned()
    }

    pub(crate) fn any_layer(&self) -> Option<Arc<dyn RemoteTrack>> {
        self.layers.read().values().next().cloned()
    }

    /// Add a simulcast layer and start its reader.
    pub(crate) fn add_layer(self: &Arc<Self>, remote: Arc<dyn RemoteTrack>) {
        let rid = remote.rid();
        self.simulcast.store(true, Ordering::Relaxed);
        self.layers.write().insert(rid.clone(), remote);
        self.start_layer_reader(rid);
    }

    /// Subscribe a peer to this track.
    ///
    /// A second subscribe for the same peer replaces (and closes) the prior
    /// subscription.
    pub fn subscribe(
        self: &Arc<Self>,
        subscriber: &Arc<Peer>,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
    ) -> Result<Arc<Subscription>, MediaError> {
        let simulcast = self.is_simulcast();

        let source = {
            let layers = self.layers.read();
            let preferred = if simulcast {
                layers.get(quality.rid()).cloned()
            } else {
                None
            };
            preferred.or_else(|| layers.values().next().cloned())
        }
        .ok_or(MediaError::NoLayersAvailable)?;

        let rid = simulcast.then(|| quality.rid());
        let local = self.factory.new_local_track(
            source.codec(),
            &self.id,
            &source.stream_id(),
            rid,
        )?;
        let down_track = Arc::new(DownTrack::new(local, self.publisher_id.clone()));
        subscriber.add_down_track(Arc::clone(&down_track))?;

        let sub = Subscription::new(
            self,
            Arc::clone(subscriber),
            down_track,
            quality,
            max_temporal,
            max_spatial,
        );

        let prior = self
            .subscribers
            .write()
            .insert(subscriber.id().to_string(), Arc::clone(&sub));
        if let Some(prior) = prior {
            prior.close();
        }

        self.start_forwarder(&sub);
        Ok(sub)
    }

    /// Remove a peer's subscription. Idempotent.
    pub fn unsubscribe(&self, subscriber_peer_id: &str) {
        let sub = self.subscribers.write().remove(subscriber_peer_id);
        if let Some(sub) = sub {
            sub.close();
            sub.subscriber().remove_down_track(&self.id);
        }
    }

    pub fn update_subscription(
        &self,
        subscriber_peer_id: &str,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
        paused: bool,
    ) -> Result<(), MediaError> {
        let sub = self
            .subscribers
            .read()
            .get(subscriber_peer_id)
            .cloned()
            .ok_or(MediaError::SubscriptionNotFound)?;
        sub.update(quality, max_temporal, max_spatial, paused);
        Ok(())
    }

    pub fn subscription_for(&self, subscriber_peer_id: &str) -> Option<Arc<Subscription>> {
        self.subscribers.read().get(subscriber_peer_id).cloned()
    }

    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscribers.read().values().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub(crate) fn add_audio_tap(&self, id: impl Into<String>, tap: AudioTap) {
        self.audio_taps.write().insert(id.into(), tap);
    }

    pub(crate) fn remove_audio_tap(&self, id: &str) {
        self.audio_taps.write().remove(id);
    }

    pub fn info(&self) -> PublisherTrackInfo {
        PublisherTrackInfo {
            id: self.id.clone(),
            peer_id: self.publisher_id.clone(),
            kind: self.kind,
            mime_type: self.mime_type.clone(),
            simulcast: self.is_simulcast(),
            svc: self.is_svc(),
            layers: self.layers.read().keys().cloned().collect(),
            encryption: self.encryption.clone(),
        }
    }

    /// Cancel all subscriptions and the layer readers.
    pub fn close(&self) {
        let subs: Vec<Arc<Subscription>> = {
            let mut subscribers = self.subscribers.write();
            let subs = subscribers.values().cloned().collect();
            subscribers.clear();
            subs
        };
        self.audio_taps.write().clear();

        for sub in subs {
            sub.close();
            sub.subscriber().remove_down_track(&self.id);
        }
        self.cancel.cancel();
    }

    fn start_layer_reader(self: &Arc<Self>, rid: String) {
        let track = Arc::clone(self);
        self.pool.spawn(async move {
            track.layer_reader_loop(rid).await;
        });
    }

    /// Read RTP from one layer, feeding the speaker detector and audio taps.
    /// Non-simulcast, non-SVC subscribers are written to directly; layered
    /// tracks are served by per-subscription forwarders instead.
    async fn layer_reader_loop(self: Arc<Self>, rid: String) {
        let Some(remote) = self.layer(&rid) else {
            return;
        };
        let codec = remote.codec().mime_type;
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            let n = tokio::select! {
                _ = self.cancel.cancelled() => return,
                res = remote.read(&mut buf) => match res {
                    Ok(n) => n,
                    // A broken layer terminates only its own reader.
                    Err(_) => return,
                },
            };

            if self.kind == TrackKind::Audio && n > rtp::FIXED_HEADER_LEN {
                self.handle_audio_packet(&buf[..n], &codec);
            }

            if !self.is_simulcast() && !self.is_svc() {
                let subs: Vec<Arc<Subscription>> =
                    self.subscribers.read().values().cloned().collect();
                for sub in subs {
                    if !sub.is_paused() {
                        sub.down_track().write(&buf[..n]);
                    }
                }
            }
        }
    }

    fn handle_audio_packet(&self, packet: &[u8], codec: &str) {
        if let Some(speaker) = &self.speaker {
            if let Some(view) = rtp::parse(packet) {
                if let Some(ext) = view.extension(self.audio_level_ext_id) {
                    if let Some(level) = rtp::parse_audio_level(ext) {
                        speaker.update_level(&self.publisher_id, level.level, level.voice);
                    }
                }
            }
        }

        let taps: Vec<(String, AudioTap)> = {
            let taps = self.audio_taps.read();
            taps.iter().map(|(id, tap)| (id.clone(), tap.clone())).collect()
        };
        if taps.is_empty() {
            return;
        }

        let payload: Arc<[u8]> = Arc::from(&packet[rtp::FIXED_HEADER_LEN..]);
        for (tap_id, tap) in taps {
            let payload = Arc::clone(&payload);
            let peer_id = self.publisher_id.clone();
            let codec = codec.to_string();
            let accepted = self.pool.try_spawn(async move {
                tap(&peer_id, &payload, &codec);
            });
            if !accepted {
                tracing::warn!(track = %self.id, tap = %tap_id, "audio tap pool full, dropping frame");
            }
        }
    }

    fn start_forwarder(self: &Arc<Self>, sub: &Arc<Subscription>) {
        // Simple tracks are written to from the layer reader directly.
        if !self.is_simulcast() && !self.is_svc() {
            return;
        }

        let track = Arc::clone(self);
        let sub = Arc::clone(sub);
        self.pool.spawn(async move {
            if track.is_simulcast() {
                forwarder::run_simulcast_forwarder(track, sub).await;
            } else if let Some(remote) = track.any_layer() {
                forwarder::run_svc_forwarder(remote, sub).await;
            }
        });
    }
}
