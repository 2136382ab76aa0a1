//! Audio frame types

use serde::{Deserialize, Serialize};

/// A chunk of encoded audio moving through the system.
///
/// The payload stays in its wire encoding end to end; nothing in this
/// workspace decodes or re-encodes media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Encoded payload bytes
    pub data: Vec<u8>,
    /// MIME type of the encoding (e.g. "audio/opus")
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u8,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>, codec: impl Into<String>, sample_rate: u32, channels: u8) -> Self {
        Self {
            data,
            codec: codec.into(),
            sample_rate,
            channels,
        }
    }

    /// An Opus frame at the room's native 48 kHz stereo clock.
    pub fn opus(data: Vec<u8>) -> Self {
        Self::new(data, "audio/opus", 48_000, 2)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
