//! Selective Forwarding Unit
//!
//! Routes RTP between peers without ever decoding media. A room owns its
//! peers, published tracks, and speaker detector; a published track owns its
//! subscriptions and the reader task per simulcast layer. The media transport
//! itself (ICE, DTLS, SRTP) lives behind the traits in [`traits`]; this crate
//! only moves packets.

pub mod codecs;
pub mod down_track;
pub mod encryption;
mod forwarder;
pub mod loopback;
pub mod peer;
pub mod publisher_track;
pub mod room;
pub mod rtp;
pub mod sfu;
pub mod speaker;
pub mod subscription;
pub mod traits;

pub use down_track::DownTrack;
pub use encryption::{validate_e2ee, EncryptionInfo};
pub use peer::{Peer, PeerConfig, PeerInfo, PeerState};
pub use publisher_track::{PublisherTrack, PublisherTrackInfo};
pub use room::{AudioTap, Room, RoomOptions};
pub use sfu::{RoomConfig, Sfu, SfuConfig, SfuStats};
pub use speaker::{ActiveSpeakerInfo, SpeakerDetector};
pub use subscription::{Subscription, SubscriptionDetail, VideoQuality};
pub use traits::{
    CodecInfo, FeedbackRequest, LocalTrack, RemoteTrack, SessionEvent, TrackFactory, TrackKind,
    TransportSession, TransportState,
};

use thiserror::Error;

/// Errors surfaced by SFU operations.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("room {0:?} already exists")]
    RoomExists(String),

    #[error("room {0:?} not found")]
    RoomNotFound(String),

    #[error("room {0:?} is closed")]
    RoomClosed(String),

    #[error("room {id:?} is full ({count}/{max} peers)")]
    RoomFull {
        id: String,
        count: usize,
        max: usize,
    },

    #[error("peer {0:?} not found")]
    PeerNotFound(String),

    #[error("track {0:?} not found")]
    TrackNotFound(String),

    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("no layers available for track")]
    NoLayersAvailable,

    #[error("room requires E2EE but peer has no encryption info")]
    E2eeMissing,

    #[error("room requires E2EE but peer has no encryption algorithm")]
    E2eeNoAlgorithm,

    #[error("track ended")]
    TrackEnded,

    #[error("transport: {0}")]
    Transport(String),
}
