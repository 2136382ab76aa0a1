//! Typed event envelopes
//!
//! Every significant state change in the system is published as an
//! [`Envelope`] carrying one of the closed set of [`EventType`]s and a typed
//! JSON payload.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of event flowing through the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "call.started")]
    CallStarted,
    #[serde(rename = "call.terminated")]
    CallTerminated,
    #[serde(rename = "speech.partial")]
    SpeechPartial,
    #[serde(rename = "speech.final")]
    SpeechFinal,
    #[serde(rename = "dtmf.received")]
    DtmfReceived,
    #[serde(rename = "state.transition")]
    StateTransition,
    #[serde(rename = "action.executed")]
    ActionExecuted,
    #[serde(rename = "hook.result")]
    HookResult,
    #[serde(rename = "hook.error")]
    HookError,
    #[serde(rename = "tts.started")]
    TtsStarted,
    #[serde(rename = "tts.completed")]
    TtsCompleted,
    #[serde(rename = "error")]
    SystemError,
    #[serde(rename = "webhook.test")]
    WebhookTest,
    #[serde(rename = "track.published")]
    TrackPublished,
    #[serde(rename = "track.unpublished")]
    TrackUnpublished,
    #[serde(rename = "speaker.changed")]
    SpeakerChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallStarted => "call.started",
            Self::CallTerminated => "call.terminated",
            Self::SpeechPartial => "speech.partial",
            Self::SpeechFinal => "speech.final",
            Self::DtmfReceived => "dtmf.received",
            Self::StateTransition => "state.transition",
            Self::ActionExecuted => "action.executed",
            Self::HookResult => "hook.result",
            Self::HookError => "hook.error",
            Self::TtsStarted => "tts.started",
            Self::TtsCompleted => "tts.completed",
            Self::SystemError => "error",
            Self::WebhookTest => "webhook.test",
            Self::TrackPublished => "track.published",
            Self::TrackUnpublished => "track.unpublished",
            Self::SpeakerChanged => "speaker.changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The standard event wrapper published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

/// Payload for `call.started`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStartedData {
    pub caller_id: String,
    pub called_number: String,
    /// "sip" or "webrtc"
    pub protocol: String,
}

/// Payload for `call.terminated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTerminatedData {
    pub reason: String,
    pub duration_ms: i64,
}

/// A timed segment of transcribed speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub start_ms: u32,
    pub end_ms: u32,
    pub confidence: f32,
}

/// Payload for `speech.partial`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechPartialData {
    pub transcript: String,
}

/// Payload for `speech.final`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechFinalData {
    pub transcript: String,
    pub confidence: f32,
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

/// Payload for `dtmf.received`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfData {
    pub digit: char,
    pub duration_ms: u32,
}

/// Payload for `state.transition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransitionData {
    pub from_state: String,
    pub to_state: String,
    pub trigger_event: String,
    pub dialog_name: String,
}

/// Payload for `action.executed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecutedData {
    pub action_type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

/// Payload for `hook.result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookResultData {
    pub hook_url: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HashMap<String, serde_json::Value>>,
}

/// Payload for `hook.error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookErrorData {
    pub hook_url: String,
    pub error: String,
}

/// Payload for `tts.started` and `tts.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsEventData {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Payload for `webhook.test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTestData {
    pub webhook_id: String,
    pub message: String,
}

/// Payload for `track.published` and `track.unpublished`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    pub track_id: String,
    pub peer_id: String,
    pub kind: String,
    pub mime_type: String,
}

/// One speaker entry inside `speaker.changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerData {
    pub peer_id: String,
    /// RFC 6464 loudness: 0 = loudest, 127 = silence
    pub audio_level: u8,
    pub voice_activity: bool,
}

/// Payload for `speaker.changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerChangedData {
    pub speakers: Vec<SpeakerData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        let json = serde_json::to_string(&EventType::StateTransition).unwrap();
        assert_eq!(json, "\"state.transition\"");
        let parsed: EventType = serde_json::from_str("\"webhook.test\"").unwrap();
        assert_eq!(parsed, EventType::WebhookTest);
        assert_eq!(EventType::SystemError.as_str(), "error");
    }

    #[test]
    fn test_envelope_round_trip() {
        let env = Envelope {
            id: "ev-1".into(),
            event_type: EventType::SpeechFinal,
            source: "speech".into(),
            session_id: "room-peer".into(),
            timestamp: Utc::now(),
            data: serde_json::json!({"transcript": "hello"}),
            metadata: None,
        };
        let raw = serde_json::to_string(&env).unwrap();
        assert!(raw.contains("\"type\":\"speech.final\""));
        assert!(!raw.contains("metadata"));
        let back: Envelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.id, "ev-1");
        assert_eq!(back.event_type, EventType::SpeechFinal);
    }
}
