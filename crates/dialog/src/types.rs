//! Dialog definition types
//!
//! The YAML-mappable shape of a dialog: states, transitions, and actions.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A dialog definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dialog {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Default session variables.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub initial_state: String,
    #[serde(default)]
    pub states: HashMap<String, State>,
}

/// A single state in the dialog FSM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub on_enter: Vec<Action>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Duration string, e.g. "30s" or "500ms".
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub timeout_next: Option<String>,
    #[serde(default)]
    pub terminal: bool,
}

/// A condition under which the FSM moves to a new state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// "speech", "dtmf", or a custom event name.
    pub event: String,
    #[serde(default)]
    pub condition: Option<String>,
    pub target: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Operation kinds executable on state entry or transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PlayTts,
    CallHook,
    SetVariable,
    Hangup,
    PlayAudio,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayTts => "play_tts",
            Self::CallHook => "call_hook",
            Self::SetVariable => "set_variable",
            Self::Hangup => "hangup",
            Self::PlayAudio => "play_audio",
        }
    }
}

/// An operation executed during a transition or on state entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Dialog metadata for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DialogInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub initial_state: String,
    pub states: Vec<String>,
}

/// Parse a duration string: "500ms", "30s", "5m", "1h". Fractions are
/// accepted ("1.5s"). Returns None for anything non-positive or malformed.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (value, scale) = if let Some(v) = s.strip_suffix("ms") {
        (v, 0.001)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60.0)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3600.0)
    } else {
        return None;
    };

    let value: f64 = value.trim().parse().ok()?;
    if value <= 0.0 || !value.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(value * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("10"), None);
    }

    #[test]
    fn test_action_type_yaml_names() {
        let action: Action = serde_yaml::from_str("type: play_tts\nparams:\n  text: hi\n").unwrap();
        assert_eq!(action.action_type, ActionType::PlayTts);
        assert_eq!(action.param("text"), Some("hi"));

        assert!(serde_yaml::from_str::<Action>("type: no_such_action").is_err());
    }

    #[test]
    fn test_dialog_yaml_shape() {
        let yaml = r#"
name: greet
version: "1"
initial_state: hello
variables:
  lang: en
states:
  hello:
    on_enter:
      - type: play_tts
        params: {text: "Hi!"}
    transitions:
      - event: speech
        target: bye
    timeout: 30s
    timeout_next: bye
  bye:
    terminal: true
"#;
        let dialog: Dialog = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(dialog.name, "greet");
        assert_eq!(dialog.initial_state, "hello");
        assert_eq!(dialog.states.len(), 2);
        let hello = &dialog.states["hello"];
        assert_eq!(hello.timeout.as_deref(), Some("30s"));
        assert_eq!(hello.timeout_next.as_deref(), Some("bye"));
        assert!(dialog.states["bye"].terminal);
    }
}
