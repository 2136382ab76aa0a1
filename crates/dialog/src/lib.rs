//! Dialog engine
//!
//! Loads YAML dialog definitions, validates them, and runs a per-session
//! finite-state-machine loop: speech and DTMF events drive transitions, state
//! timeouts drive fallbacks, and actions flow back to the caller.

pub mod engine;
pub mod fsm;
pub mod hooks;
pub mod loader;
pub mod session;
pub mod template;
pub mod types;

pub use engine::{DialogTurn, Engine, SessionSnapshot, SpeakFn, SpeechEvent};
pub use fsm::StateMachine;
pub use hooks::{HookConfig, HookExecutor, HookRequest, HookResponse};
pub use loader::Loader;
pub use session::{Session, StateRecord, DEFAULT_MAX_HISTORY};
pub use template::{eval_condition, render_param, TemplateError};
pub use types::{parse_duration, Action, ActionType, Dialog, DialogInfo, State, Transition};

use thiserror::Error;

/// Errors surfaced by dialog operations.
#[derive(Debug, Error)]
pub enum DialogError {
    #[error("dialog {0:?} not found")]
    DialogNotFound(String),

    #[error("session {0:?} not found")]
    SessionNotFound(String),

    #[error("session {0:?} already exists")]
    SessionExists(String),

    #[error("state {state:?} not found in dialog {dialog:?}")]
    StateNotFound { dialog: String, state: String },

    #[error("dialog {dialog:?}: {message}")]
    Validation { dialog: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("unsupported event type {0:?}")]
    UnsupportedEvent(String),

    #[error("dialog engine busy, cannot accept {0} event")]
    Busy(&'static str),

    #[error("dialog engine timeout")]
    DeadlineExceeded,

    #[error("session loop ended")]
    SessionEnded,

    #[error("read dialog dir {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("hook URL validation: {0}")]
    HookUrl(#[from] voicebridge_core::UrlError),

    #[error("hook: {0}")]
    Hook(String),
}
