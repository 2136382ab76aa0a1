//! In-memory loopback transport
//!
//! Channel-backed implementation of the transport traits. Backs the test
//! suite and local development runs; production deployments wire a real
//! WebRTC stack behind the same traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::codecs;
use crate::traits::{
    CodecInfo, FeedbackRequest, LocalTrack, RemoteTrack, SessionEvent, TrackFactory, TrackKind,
    TransportSession, TransportState,
};
use crate::MediaError;

const TRACK_CHANNEL_CAPACITY: usize = 256;

/// Creates [`LoopbackLocalTrack`]s and keeps handles to them so tests can
/// inspect what was forwarded.
#[derive(Default)]
pub struct LoopbackFactory {
    tracks: RwLock<Vec<Arc<LoopbackLocalTrack>>>,
}

impl LoopbackFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn local_tracks(&self) -> Vec<Arc<LoopbackLocalTrack>> {
        self.tracks.read().clone()
    }

    /// Find a created local track by id and optional RID.
    pub fn local_track(&self, id: &str, rid: Option<&str>) -> Option<Arc<LoopbackLocalTrack>> {
        self.tracks
            .read()
            .iter()
            .find(|t| t.id == id && t.rid.as_deref() == rid)
            .cloned()
    }
}

impl TrackFactory for LoopbackFactory {
    fn new_local_track(
        &self,
        codec: CodecInfo,
        id: &str,
        stream_id: &str,
        rid: Option<&str>,
    ) -> Result<Arc<dyn LocalTrack>, MediaError> {
        let track = Arc::new(LoopbackLocalTrack {
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            rid: rid.map(str::to_string),
            codec,
            written: Mutex::new(Vec::new()),
        });
        self.tracks.write().push(Arc::clone(&track));
        Ok(track)
    }
}

/// A local track that records every packet written to it.
pub struct LoopbackLocalTrack {
    id: String,
    stream_id: String,
    rid: Option<String>,
    codec: CodecInfo,
    written: Mutex<Vec<Vec<u8>>>,
}

impl LoopbackLocalTrack {
    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn packet_count(&self) -> usize {
        self.written.lock().len()
    }
}

impl LocalTrack for LoopbackLocalTrack {
    fn write(&self, packet: &[u8]) -> Result<(), MediaError> {
        self.written.lock().push(packet.to_vec());
        Ok(())
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn rid(&self) -> Option<String> {
        self.rid.clone()
    }

    fn codec(&self) -> CodecInfo {
        self.codec.clone()
    }
}

/// A remote track fed from a channel of packets.
pub struct LoopbackRemoteTrack {
    id: String,
    stream_id: String,
    kind: TrackKind,
    codec: CodecInfo,
    rid: String,
    ssrc: u32,
    rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl LoopbackRemoteTrack {
    pub fn new(
        id: impl Into<String>,
        stream_id: impl Into<String>,
        kind: TrackKind,
        codec: CodecInfo,
        rid: impl Into<String>,
        ssrc: u32,
    ) -> (Arc<Self>, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(TRACK_CHANNEL_CAPACITY);
        let track = Arc::new(Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            codec,
            rid: rid.into(),
            ssrc,
            rx: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }

    /// An Opus audio track with the default codec parameters.
    pub fn opus(
        id: impl Into<String>,
        stream_id: impl Into<String>,
    ) -> (Arc<Self>, mpsc::Sender<Vec<u8>>) {
        let codec = CodecInfo {
            mime_type: codecs::MIME_OPUS.into(),
            clock_rate: 48_000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".into(),
            payload_type: 111,
        };
        Self::new(id, stream_id, TrackKind::Audio, codec, "", 0)
    }

    /// A VP9 video track, optionally a simulcast layer.
    pub fn vp9(
        id: impl Into<String>,
        stream_id: impl Into<String>,
        rid: impl Into<String>,
        ssrc: u32,
    ) -> (Arc<Self>, mpsc::Sender<Vec<u8>>) {
        let codec = CodecInfo {
            mime_type: codecs::MIME_VP9.into(),
            clock_rate: 90_000,
            channels: 0,
            sdp_fmtp_line: "profile-id=0".into(),
            payload_type: 98,
        };
        Self::new(id, stream_id, TrackKind::Video, codec, rid, ssrc)
    }
}

#[async_trait]
impl RemoteTrack for LoopbackRemoteTrack {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, MediaError> {
        let mut rx = self.rx.lock().await;
        let packet = rx.recv().await.ok_or(MediaError::TrackEnded)?;
        let n = packet.len().min(buf.len());
        buf[..n].copy_from_slice(&packet[..n]);
        Ok(n)
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn codec(&self) -> CodecInfo {
        self.codec.clone()
    }

    fn rid(&self) -> String {
        self.rid.clone()
    }

    fn ssrc(&self) -> u32 {
        self.ssrc
    }
}

#[derive(Default)]
struct LoopbackSessionState {
    remote_sdp: Option<String>,
    local_sdp: Option<String>,
    event_tx: Option<mpsc::Sender<SessionEvent>>,
    pending: Vec<SessionEvent>,
    local_tracks: Vec<Arc<dyn LocalTrack>>,
    feedback: Vec<FeedbackRequest>,
    closed: bool,
}

/// An in-memory transport session. Tests drive it by publishing tracks and
/// reporting connection states.
#[derive(Default)]
pub struct LoopbackSession {
    state: Mutex<LoopbackSessionState>,
}

impl LoopbackSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Announce a remote track, as a transport would after negotiation.
    pub fn publish_track(&self, remote: Arc<dyn RemoteTrack>) {
        self.deliver(SessionEvent::TrackPublished(remote));
    }

    /// Report a transport connection state change.
    pub fn set_transport_state(&self, state: TransportState) {
        self.deliver(SessionEvent::StateChanged(state));
    }

    /// Keyframe requests sent toward this session's publisher.
    pub fn feedback_requests(&self) -> Vec<FeedbackRequest> {
        self.state.lock().feedback.clone()
    }

    pub fn local_tracks(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.state.lock().local_tracks.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn deliver(&self, event: SessionEvent) {
        let mut state = self.state.lock();
        match &state.event_tx {
            Some(tx) => {
                if tx.try_send(event).is_err() {
                    tracing::debug!("loopback session event dropped");
                }
            }
            None => state.pending.push(event),
        }
    }
}

#[async_trait]
impl TransportSession for LoopbackSession {
    async fn set_remote_description(&self, offer_sdp: &str) -> Result<(), MediaError> {
        self.state.lock().remote_sdp = Some(offer_sdp.to_string());
        Ok(())
    }

    async fn create_answer(&self) -> Result<String, MediaError> {
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=loopback\r\nt=0 0\r\n".to_string())
    }

    async fn set_local_description(&self, sdp: &str) -> Result<(), MediaError> {
        self.state.lock().local_sdp = Some(sdp.to_string());
        Ok(())
    }

    async fn await_ice_gathering(&self) {}

    fn local_description(&self) -> Option<String> {
        self.state.lock().local_sdp.clone()
    }

    async fn add_ice_candidate(&self, _candidate_json: &str) -> Result<(), MediaError> {
        Ok(())
    }

    fn add_local_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MediaError::Transport("session closed".into()));
        }
        state.local_tracks.push(track);
        Ok(())
    }

    fn send_feedback(&self, requests: &[FeedbackRequest]) -> Result<(), MediaError> {
        self.state.lock().feedback.extend_from_slice(requests);
        Ok(())
    }

    fn set_event_sender(&self, tx: mpsc::Sender<SessionEvent>) {
        let mut state = self.state.lock();
        for event in state.pending.drain(..) {
            let _ = tx.try_send(event);
        }
        state.event_tx = Some(tx);
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }
}
