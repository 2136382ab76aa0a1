//! Peers
//!
//! A peer wraps one transport session inside a room. Transport events drive
//! the peer state machine: `connected` on connectivity, self-removal from the
//! room on `failed`/`closed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::down_track::DownTrack;
use crate::encryption::EncryptionInfo;
use crate::room::Room;
use crate::traits::{FeedbackRequest, RemoteTrack, SessionEvent, TransportSession, TransportState};
use crate::MediaError;

const SESSION_EVENT_BUFFER: usize = 32;

/// A peer's media capabilities.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub publish_audio: bool,
    pub publish_video: bool,
    pub simulcast: bool,
    pub auto_subscribe_audio: bool,
    pub encryption: Option<EncryptionInfo>,
}

impl Default for PeerConfig {
    /// Audio-only publishing with auto-subscribe, the voice-room default.
    fn default() -> Self {
        Self {
            publish_audio: true,
            publish_video: false,
            simulcast: false,
            auto_subscribe_audio: true,
            encryption: None,
        }
    }
}

/// Peer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Connecting,
    Connected,
    Disconnected,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Peer metadata for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: String,
    pub state: PeerState,
    pub metadata: HashMap<String, String>,
    pub published_tracks: usize,
    pub subscribed_tracks: usize,
}

/// One participant in a room.
pub struct Peer {
    id: String,
    session: Arc<dyn TransportSession>,
    room: RwLock<Weak<Room>>,
    state: RwLock<PeerState>,
    metadata: HashMap<String, String>,
    published: RwLock<HashMap<String, Arc<dyn RemoteTrack>>>,
    down_tracks: RwLock<HashMap<String, Arc<DownTrack>>>,
    config: PeerConfig,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Peer {
    pub fn new(
        id: Option<String>,
        session: Arc<dyn TransportSession>,
        metadata: HashMap<String, String>,
        config: PeerConfig,
    ) -> Arc<Self> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Arc::new(Self {
            id,
            session,
            room: RwLock::new(Weak::new()),
            state: RwLock::new(PeerState::Connecting),
            metadata,
            published: RwLock::new(HashMap::new()),
            down_tracks: RwLock::new(HashMap::new()),
            config,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PeerState {
        *self.state.read()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn encryption(&self) -> Option<&EncryptionInfo> {
        self.config.encryption.as_ref()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn room(&self) -> Option<Arc<Room>> {
        self.room.read().upgrade()
    }

    /// Wire the peer into its room and start consuming transport events.
    /// Called by `Room::add_peer`.
    pub(crate) fn attach(self: &Arc<Self>, room: &Arc<Room>) {
        *self.room.write() = Arc::downgrade(room);
        let (tx, rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        self.session.set_event_sender(tx);
        let peer = Arc::clone(self);
        room.pool().spawn(async move {
            peer.event_loop(rx).await;
        });
    }

    async fn event_loop(self: Arc<Self>, mut rx: mpsc::Receiver<SessionEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };

            match event {
                SessionEvent::TrackPublished(remote) => {
                    self.published.write().insert(remote.id(), Arc::clone(&remote));
                    if let Some(room) = self.room() {
                        room.register_publisher_track(&self, remote);
                    }
                }
                SessionEvent::StateChanged(state) => match state {
                    TransportState::Connected => {
                        *self.state.write() = PeerState::Connected;
                    }
                    TransportState::Failed | TransportState::Closed => {
                        *self.state.write() = PeerState::Disconnected;
                        if let Some(room) = self.room() {
                            tracing::info!(peer_id = %self.id, "transport gone, removing peer");
                            room.remove_peer(&self.id).await;
                        }
                        return;
                    }
                    TransportState::Disconnected => {
                        *self.state.write() = PeerState::Disconnected;
                    }
                    TransportState::Connecting => {}
                },
            }
        }
    }

    /// Apply a remote SDP offer and produce the answer, waiting for ICE
    /// gathering so the answer is complete.
    pub async fn handle_offer(&self, offer_sdp: &str) -> Result<String, MediaError> {
        self.session.set_remote_description(offer_sdp).await?;
        let answer = self.session.create_answer().await?;
        self.session.set_local_description(&answer).await?;
        self.session.await_ice_gathering().await;
        Ok(self.session.local_description().unwrap_or(answer))
    }

    /// Mid-session renegotiation for track add/remove.
    pub async fn renegotiate(&self, offer_sdp: &str) -> Result<String, MediaError> {
        self.handle_offer(offer_sdp).await
    }

    pub async fn add_ice_candidate(&self, candidate_json: &str) -> Result<(), MediaError> {
        self.session.add_ice_candidate(candidate_json).await
    }

    pub(crate) fn add_down_track(&self, down_track: Arc<DownTrack>) -> Result<(), MediaError> {
        self.session.add_local_track(down_track.local_track())?;
        self.down_tracks
            .write()
            .insert(down_track.track_id().to_string(), down_track);
        Ok(())
    }

    pub(crate) fn remove_down_track(&self, track_id: &str) {
        self.down_tracks.write().remove(track_id);
    }

    pub(crate) fn send_feedback(&self, requests: &[FeedbackRequest]) {
        if let Err(err) = self.session.send_feedback(requests) {
            tracing::debug!(peer_id = %self.id, error = %err, "feedback send failed");
        }
    }

    /// Close the peer. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.down_tracks.write().clear();
        self.published.write().clear();
        *self.state.write() = PeerState::Disconnected;
        self.cancel.cancel();
        self.session.close().await;
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            state: *self.state.read(),
            metadata: self.metadata.clone(),
            published_tracks: self.published.read().len(),
            subscribed_tracks: self.down_tracks.read().len(),
        }
    }

    /// Snapshot of this peer's subscriptions, via its room's track table.
    pub fn subscription_details(&self) -> Vec<crate::subscription::SubscriptionDetail> {
        let Some(room) = self.room() else {
            return Vec::new();
        };
        room.list_publisher_tracks()
            .iter()
            .filter_map(|track| track.subscription_for(&self.id))
            .map(|sub| sub.detail())
            .collect()
    }
}
