//! Codec and header-extension registry
//!
//! The capabilities a transport implementation should negotiate. The SFU
//! itself only consults the audio-level extension id; everything else is
//! negotiation input.

use crate::traits::{CodecInfo, TrackKind};

pub const MIME_OPUS: &str = "audio/opus";
pub const MIME_VP8: &str = "video/VP8";
pub const MIME_VP9: &str = "video/VP9";
pub const MIME_H264: &str = "video/H264";
pub const MIME_AV1: &str = "video/AV1";

pub const AUDIO_LEVEL_URI: &str = "urn:ietf:params:rtp-hdrext:ssrc-audio-level";
pub const MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
pub const RTP_STREAM_ID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";

/// Header extension id the audio-level parser looks for unless configured
/// otherwise.
pub const DEFAULT_AUDIO_LEVEL_EXT_ID: u8 = 1;

/// A header extension a transport should register.
#[derive(Debug, Clone)]
pub struct HeaderExtension {
    pub uri: &'static str,
    pub kind: TrackKind,
}

pub fn header_extensions() -> Vec<HeaderExtension> {
    vec![
        HeaderExtension {
            uri: AUDIO_LEVEL_URI,
            kind: TrackKind::Audio,
        },
        HeaderExtension {
            uri: MID_URI,
            kind: TrackKind::Video,
        },
        HeaderExtension {
            uri: RTP_STREAM_ID_URI,
            kind: TrackKind::Video,
        },
    ]
}

/// The default codec set: Opus for audio, VP8/VP9/H264/AV1 for video.
pub fn default_codecs() -> Vec<(CodecInfo, TrackKind)> {
    vec![
        (
            CodecInfo {
                mime_type: MIME_OPUS.into(),
                clock_rate: 48_000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".into(),
                payload_type: 111,
            },
            TrackKind::Audio,
        ),
        (
            CodecInfo {
                mime_type: MIME_VP8.into(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                payload_type: 96,
            },
            TrackKind::Video,
        ),
        (
            CodecInfo {
                mime_type: MIME_VP9.into(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: "profile-id=0".into(),
                payload_type: 98,
            },
            TrackKind::Video,
        ),
        (
            CodecInfo {
                mime_type: MIME_H264.into(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line:
                    "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f".into(),
                payload_type: 102,
            },
            TrackKind::Video,
        ),
        (
            CodecInfo {
                mime_type: MIME_AV1.into(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                payload_type: 35,
            },
            TrackKind::Video,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codec_payload_types() {
        let codecs = default_codecs();
        let opus = codecs.iter().find(|(c, _)| c.mime_type == MIME_OPUS).unwrap();
        assert_eq!(opus.0.payload_type, 111);
        assert_eq!(opus.0.clock_rate, 48_000);
        let vp9 = codecs.iter().find(|(c, _)| c.mime_type == MIME_VP9).unwrap();
        assert_eq!(vp9.0.payload_type, 98);
    }
}
