//! Rooms
//!
//! A room owns its peers, published tracks, audio taps, and speaker
//! detector. Callbacks (taps, listeners) are invoked without the room lock
//! held so they may call back into the room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use voicebridge_core::events::{SpeakerChangedData, SpeakerData, TrackData};
use voicebridge_core::{EventType, Publisher, TaskPool};

use crate::encryption::validate_e2ee;
use crate::peer::Peer;
use crate::publisher_track::PublisherTrack;
use crate::speaker::{ActiveSpeakerInfo, SpeakerDetector};
use crate::subscription::{Subscription, VideoQuality};
use crate::traits::{RemoteTrack, TrackFactory, TrackKind};
use crate::MediaError;

/// Callback for audio data tapped from a peer: (peer id, RTP payload, codec).
/// The payload is codec-encoded, never decoded PCM.
pub type AudioTap = Arc<dyn Fn(&str, &[u8], &str) + Send + Sync>;

/// Room-level configuration fixed at creation time.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub max_publishers: usize,
    pub auto_subscribe_audio: bool,
    pub e2ee_required: bool,
    pub speaker_threshold: u8,
    pub speaker_interval: Duration,
    pub audio_level_ext_id: u8,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            max_publishers: 100,
            auto_subscribe_audio: false,
            e2ee_required: false,
            speaker_threshold: 30,
            speaker_interval: Duration::from_millis(500),
            audio_level_ext_id: crate::codecs::DEFAULT_AUDIO_LEVEL_EXT_ID,
        }
    }
}

struct RoomInner {
    peers: HashMap<String, Arc<Peer>>,
    publisher_tracks: HashMap<String, Arc<PublisherTrack>>,
    audio_taps: HashMap<String, AudioTap>,
    closed: bool,
}

/// A set of peers with track routing between them.
pub struct Room {
    id: String,
    max_peers: usize,
    max_publishers: usize,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
    inner: RwLock<RoomInner>,
    speaker: Arc<SpeakerDetector>,
    auto_subscribe_audio: bool,
    e2ee_required: bool,
    audio_level_ext_id: u8,
    pool: TaskPool,
    factory: Arc<dyn TrackFactory>,
    events: Option<Arc<Publisher>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("id", &self.id).finish()
    }
}

impl Room {
    pub fn new(
        id: impl Into<String>,
        max_peers: usize,
        metadata: HashMap<String, String>,
        pool: TaskPool,
        factory: Arc<dyn TrackFactory>,
        events: Option<Arc<Publisher>>,
        opts: RoomOptions,
    ) -> Arc<Self> {
        let id = id.into();
        let max_peers = if max_peers == 0 { 1000 } else { max_peers };
        let max_publishers = if opts.max_publishers == 0 {
            100
        } else {
            opts.max_publishers
        };

        let speaker =
            SpeakerDetector::new(opts.speaker_threshold, opts.speaker_interval, pool.clone());
        let cancel = CancellationToken::new();

        let room = Arc::new(Self {
            id: id.clone(),
            max_peers,
            max_publishers,
            metadata,
            created_at: Utc::now(),
            inner: RwLock::new(RoomInner {
                peers: HashMap::new(),
                publisher_tracks: HashMap::new(),
                audio_taps: HashMap::new(),
                closed: false,
            }),
            speaker,
            auto_subscribe_audio: opts.auto_subscribe_audio,
            e2ee_required: opts.e2ee_required,
            audio_level_ext_id: opts.audio_level_ext_id,
            pool,
            factory,
            events,
            cancel,
        });

        if room.events.is_some() {
            room.start_speaker_event_bridge();
        }
        room
    }

    fn start_speaker_event_bridge(self: &Arc<Self>) {
        let mut rx = self.speaker.add_listener(format!("room:{}", self.id));
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        self.pool.spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = cancel.cancelled() => return,
                    update = rx.recv() => match update {
                        Some(update) => update,
                        None => return,
                    },
                };
                let Some(room) = weak.upgrade() else { return };
                let speakers = update
                    .into_iter()
                    .map(|s: ActiveSpeakerInfo| SpeakerData {
                        peer_id: s.peer_id,
                        audio_level: s.audio_level,
                        voice_activity: s.voice_activity,
                    })
                    .collect();
                room.emit_event(EventType::SpeakerChanged, SpeakerChangedData { speakers });
            }
        });
    }

    fn emit_event<T: Serialize + Send + Sync + 'static>(&self, event_type: EventType, data: T) {
        if let Some(events) = &self.events {
            let events = Arc::clone(events);
            let session_id = self.id.clone();
            self.pool.spawn(async move {
                if let Err(err) = events.emit(event_type, &session_id, &data).await {
                    tracing::debug!(error = %err, event_type = %event_type, "room event emit failed");
                }
            });
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    pub fn max_publishers(&self) -> usize {
        self.max_publishers
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn e2ee_required(&self) -> bool {
        self.e2ee_required
    }

    pub(crate) fn pool(&self) -> &TaskPool {
        &self.pool
    }

    /// Add a peer, enforcing capacity and E2EE requirements.
    ///
    /// Returns the tracks already published in the room so the client can
    /// subscribe. With auto-subscribe enabled the new peer is subscribed to
    /// every existing audio track (best effort).
    pub fn add_peer(self: &Arc<Self>, peer: Arc<Peer>) -> Result<Vec<Arc<PublisherTrack>>, MediaError> {
        let available = {
            let mut inner = self.inner.write();
            if inner.closed {
                return Err(MediaError::RoomClosed(self.id.clone()));
            }
            if inner.peers.len() >= self.max_peers {
                return Err(MediaError::RoomFull {
                    id: self.id.clone(),
                    count: inner.peers.len(),
                    max: self.max_peers,
                });
            }
            validate_e2ee(self.e2ee_required, peer.encryption())?;

            inner.peers.insert(peer.id().to_string(), Arc::clone(&peer));

            // First peer brings the speaker detector up.
            if inner.peers.len() == 1 {
                self.speaker.start();
            }

            let available: Vec<Arc<PublisherTrack>> =
                inner.publisher_tracks.values().cloned().collect();

            if self.auto_subscribe_audio && peer.config().auto_subscribe_audio {
                for track in inner.publisher_tracks.values() {
                    if track.kind() == TrackKind::Audio && track.publisher_id() != peer.id() {
                        if let Err(err) = track.subscribe(&peer, VideoQuality::High, -1, -1) {
                            tracing::warn!(
                                room = %self.id,
                                peer_id = %peer.id(),
                                track = %track.id(),
                                error = %err,
                                "auto-subscribe failed"
                            );
                        }
                    }
                }
            }
            available
        };

        peer.attach(self);
        Ok(available)
    }

    /// Remove a peer, closing its subscriptions and owned tracks.
    pub async fn remove_peer(&self, peer_id: &str) {
        let (peer, owned_tracks) = {
            let mut inner = self.inner.write();
            let Some(peer) = inner.peers.remove(peer_id) else {
                return;
            };

            for track in inner.publisher_tracks.values() {
                track.unsubscribe(peer_id);
            }

            let owned_ids: Vec<String> = inner
                .publisher_tracks
                .iter()
                .filter(|(_, t)| t.publisher_id() == peer_id)
                .map(|(id, _)| id.clone())
                .collect();
            let mut owned = Vec::with_capacity(owned_ids.len());
            for id in owned_ids {
                if let Some(track) = inner.publisher_tracks.remove(&id) {
                    owned.push(track);
                }
            }
            (peer, owned)
        };

        for track in owned_tracks {
            track.close();
            self.emit_event(
                EventType::TrackUnpublished,
                TrackData {
                    track_id: track.id().to_string(),
                    peer_id: peer_id.to_string(),
                    kind: track.kind().as_str().to_string(),
                    mime_type: track.mime_type().to_string(),
                },
            );
        }

        self.speaker.remove_peer(peer_id);
        peer.close().await;
    }

    pub fn get_peer(&self, peer_id: &str) -> Option<Arc<Peer>> {
        self.inner.read().peers.get(peer_id).cloned()
    }

    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.inner.read().peers.values().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// Number of peers currently publishing at least one track.
    pub fn publisher_count(&self) -> usize {
        let inner = self.inner.read();
        let publishers: std::collections::HashSet<&str> = inner
            .publisher_tracks
            .values()
            .map(|t| t.publisher_id())
            .collect();
        publishers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Close all peers and tracks and mark the room closed. Idempotent.
    pub async fn close(&self) {
        let (peers, tracks) = {
            let mut inner = self.inner.write();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let peers: Vec<Arc<Peer>> = inner.peers.drain().map(|(_, p)| p).collect();
            let tracks: Vec<Arc<PublisherTrack>> =
                inner.publisher_tracks.drain().map(|(_, t)| t).collect();
            inner.audio_taps.clear();
            (peers, tracks)
        };

        for track in tracks {
            track.close();
        }
        self.speaker.close();
        self.cancel.cancel();

        for peer in peers {
            peer.close().await;
        }
    }

    /// Register an audio tap on all current and future audio tracks.
    pub fn add_audio_tap(&self, id: impl Into<String>, tap: AudioTap) {
        let id = id.into();
        let mut inner = self.inner.write();
        inner.audio_taps.insert(id.clone(), Arc::clone(&tap));
        for track in inner.publisher_tracks.values() {
            if track.kind() == TrackKind::Audio {
                track.add_audio_tap(id.clone(), Arc::clone(&tap));
            }
        }
    }

    pub fn remove_audio_tap(&self, id: &str) {
        let mut inner = self.inner.write();
        inner.audio_taps.remove(id);
        for track in inner.publisher_tracks.values() {
            if track.kind() == TrackKind::Audio {
                track.remove_audio_tap(id);
            }
        }
    }

    /// Deliver synthetic audio (TTS playback) directly to the room's taps,
    /// bypassing the RTP path.
    pub fn inject_audio(&self, peer_id: &str, data: &[u8], codec: &str) {
        let taps: Vec<AudioTap> = {
            let inner = self.inner.read();
            inner.audio_taps.values().cloned().collect()
        };
        for tap in taps {
            tap(peer_id, data, codec);
        }
    }

    /// Register a track published by a peer. Simulcast layers with a known
    /// track id are grouped under the existing logical track.
    pub fn register_publisher_track(
        self: &Arc<Self>,
        publisher: &Arc<Peer>,
        remote: Arc<dyn RemoteTrack>,
    ) -> Arc<PublisherTrack> {
        let track_id = remote.id();
        let rid = remote.rid();

        let track = {
            let mut inner = self.inner.write();
            if let Some(existing) = inner.publisher_tracks.get(&track_id).cloned() {
                if !rid.is_empty() {
                    drop(inner);
                    existing.add_layer(remote);
                    return existing;
                }
            }

            let track = PublisherTrack::new(
                Arc::clone(publisher),
                remote,
                self.pool.clone(),
                Some(Arc::clone(&self.speaker)),
                publisher.encryption().cloned(),
                Arc::clone(&self.factory),
                self.audio_level_ext_id,
            );
            inner
                .publisher_tracks
                .insert(track_id.clone(), Arc::clone(&track));

            if track.kind() == TrackKind::Audio {
                for (id, tap) in &inner.audio_taps {
                    track.add_audio_tap(id.clone(), Arc::clone(tap));
                }

                if self.auto_subscribe_audio {
                    for peer in inner.peers.values() {
                        if peer.id() == publisher.id() || !peer.config().auto_subscribe_audio {
                            continue;
                        }
                        if let Err(err) = track.subscribe(peer, VideoQuality::High, -1, -1) {
                            tracing::warn!(
                                room = %self.id,
                                peer_id = %peer.id(),
                                error = %err,
                                "auto-subscribe failed"
                            );
                        }
                    }
                }
            }
            track
        };

        self.emit_event(
            EventType::TrackPublished,
            TrackData {
                track_id,
                peer_id: publisher.id().to_string(),
                kind: track.kind().as_str().to_string(),
                mime_type: track.mime_type().to_string(),
            },
        );
        track
    }

    /// Subscribe a peer to a published track.
    pub fn subscribe(
        &self,
        subscriber_peer_id: &str,
        track_id: &str,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
    ) -> Result<Arc<Subscription>, MediaError> {
        let (track, peer) = {
            let inner = self.inner.read();
            let track = inner
                .publisher_tracks
                .get(track_id)
                .cloned()
                .ok_or_else(|| MediaError::TrackNotFound(track_id.to_string()))?;
            let peer = inner
                .peers
                .get(subscriber_peer_id)
                .cloned()
                .ok_or_else(|| MediaError::PeerNotFound(subscriber_peer_id.to_string()))?;
            (track, peer)
        };
        track.subscribe(&peer, quality, max_temporal, max_spatial)
    }

    pub fn unsubscribe(&self, subscriber_peer_id: &str, track_id: &str) -> Result<(), MediaError> {
        let track = self
            .get_publisher_track(track_id)
            .ok_or_else(|| MediaError::TrackNotFound(track_id.to_string()))?;
        track.unsubscribe(subscriber_peer_id);
        Ok(())
    }

    pub fn update_subscription(
        &self,
        subscriber_peer_id: &str,
        track_id: &str,
        quality: VideoQuality,
        max_temporal: i32,
        max_spatial: i32,
        paused: bool,
    ) -> Result<(), MediaError> {
        let track = self
            .get_publisher_track(track_id)
            .ok_or_else(|| MediaError::TrackNotFound(track_id.to_string()))?;
        track.update_subscription(subscriber_peer_id, quality, max_temporal, max_spatial, paused)
    }

    pub fn get_publisher_track(&self, track_id: &str) -> Option<Arc<PublisherTrack>> {
        self.inner.read().publisher_tracks.get(track_id).cloned()
    }

    pub fn list_publisher_tracks(&self) -> Vec<Arc<PublisherTrack>> {
        self.inner.read().publisher_tracks.values().cloned().collect()
    }

    pub fn add_speaker_listener(
        &self,
        id: impl Into<String>,
    ) -> tokio::sync::mpsc::Receiver<Vec<ActiveSpeakerInfo>> {
        self.speaker.add_listener(id)
    }

    pub fn remove_speaker_listener(&self, id: &str) {
        self.speaker.remove_listener(id);
    }

    pub fn active_speakers(&self) -> Vec<ActiveSpeakerInfo> {
        self.speaker.active_speakers()
    }
}
