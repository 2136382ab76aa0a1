//! Media transport abstraction
//!
//! The SFU is transport-agnostic: everything it needs from the underlying
//! WebRTC (or SIP) stack is expressed through these traits. A transport
//! implementation delivers connection state changes and newly published
//! remote tracks over the session event channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::MediaError;

/// Track media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Codec capability of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecInfo {
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub sdp_fmtp_line: String,
    pub payload_type: u8,
}

/// Transport-level connection state as reported by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a transport session delivers to its owning peer.
pub enum SessionEvent {
    StateChanged(TransportState),
    TrackPublished(Arc<dyn RemoteTrack>),
}

/// A keyframe request addressed to a publisher SSRC (PLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRequest {
    pub media_ssrc: u32,
}

/// One signaling session with a remote participant.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn set_remote_description(&self, offer_sdp: &str) -> Result<(), MediaError>;

    async fn create_answer(&self) -> Result<String, MediaError>;

    async fn set_local_description(&self, sdp: &str) -> Result<(), MediaError>;

    /// Resolves once ICE candidate gathering for the local description is
    /// complete.
    async fn await_ice_gathering(&self);

    fn local_description(&self) -> Option<String>;

    async fn add_ice_candidate(&self, candidate_json: &str) -> Result<(), MediaError>;

    /// Attach a forwarded track so the remote participant receives it.
    fn add_local_track(&self, track: Arc<dyn LocalTrack>) -> Result<(), MediaError>;

    /// Send RTCP-level feedback (keyframe requests) toward the publisher.
    fn send_feedback(&self, requests: &[FeedbackRequest]) -> Result<(), MediaError>;

    /// Register the channel that receives session events. Events that occur
    /// before registration must be buffered by the implementation.
    fn set_event_sender(&self, tx: mpsc::Sender<SessionEvent>);

    async fn close(&self);
}

/// A track published by the remote participant.
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    /// Read one RTP packet into `buf`, returning its length.
    async fn read(&self, buf: &mut [u8]) -> Result<usize, MediaError>;

    fn id(&self) -> String;

    fn stream_id(&self) -> String;

    fn kind(&self) -> TrackKind;

    fn codec(&self) -> CodecInfo;

    /// Simulcast RID ("" for non-simulcast).
    fn rid(&self) -> String;

    fn ssrc(&self) -> u32;
}

/// A locally sourced track forwarded to a subscriber.
pub trait LocalTrack: Send + Sync {
    /// Write one RTP packet.
    fn write(&self, packet: &[u8]) -> Result<(), MediaError>;

    fn id(&self) -> String;

    fn stream_id(&self) -> String;

    fn rid(&self) -> Option<String>;

    fn codec(&self) -> CodecInfo;
}

/// Creates local tracks matching a publisher's codec.
pub trait TrackFactory: Send + Sync {
    fn new_local_track(
        &self,
        codec: CodecInfo,
        id: &str,
        stream_id: &str,
        rid: Option<&str>,
    ) -> Result<Arc<dyn LocalTrack>, MediaError>;
}
