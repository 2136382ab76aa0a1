//! Session engine
//!
//! One background loop per session: it waits on speech/DTMF channels and the
//! state timeout, evaluates transitions, executes actions, and hands results
//! back over the per-session result channel. A reaper cancels sessions that
//! outlive their TTL.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use voicebridge_core::events::{ActionExecutedData, StateTransitionData};
use voicebridge_core::{EventType, Publisher, TaskPool};

use crate::fsm::StateMachine;
use crate::hooks::{HookConfig, HookExecutor, HookRequest};
use crate::loader::Loader;
use crate::session::{Session, StateRecord};
use crate::template::render_param;
use crate::types::{parse_duration, Action, ActionType, DialogInfo, State};
use crate::DialogError;

const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);
/// How long `end_dialog` waits for the loop to exit.
const END_WAIT: Duration = Duration::from_secs(5);
/// How long `send_event` waits for space on a full input channel.
const SEND_WAIT: Duration = Duration::from_secs(5);
/// How long `send_event` waits for the loop to produce a result.
const RESULT_WAIT: Duration = Duration::from_secs(10);

const SPEECH_BUFFER: usize = 8;
const DTMF_BUFFER: usize = 16;
const RESULT_BUFFER: usize = 8;
const DEFAULT_HOOK_TIMEOUT_SEC: u64 = 10;

/// Synthesizes and plays text to the caller, for embedded deployments. The
/// service deployment leaves this unset and lets the orchestrator play the
/// returned `play_tts` actions instead.
pub type SpeakFn = Arc<dyn Fn(&str) + Send + Sync>;

/// A speech recognition result delivered to a session.
#[derive(Debug, Clone)]
pub struct SpeechEvent {
    pub text: String,
    pub is_final: bool,
}

/// The outcome of one dialog step, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DialogTurn {
    pub session_id: String,
    pub previous_state: String,
    pub current_state: String,
    pub terminal: bool,
    pub actions: Vec<Action>,
}

/// Read-only session view for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub dialog_name: String,
    pub current_state: String,
    pub variables: HashMap<String, String>,
    pub history: Vec<StateRecord>,
    pub started_at: DateTime<Utc>,
}

struct LoopResult {
    new_state: String,
    terminal: bool,
    actions: Vec<Action>,
    error: Option<DialogError>,
}

impl LoopResult {
    fn stay(state: String) -> Self {
        Self {
            new_state: state,
            terminal: false,
            actions: Vec::new(),
            error: None,
        }
    }

    fn fail(state: String, error: DialogError) -> Self {
        Self {
            new_state: state,
            terminal: false,
            actions: Vec::new(),
            error: Some(error),
        }
    }
}

struct ActiveSession {
    session: Arc<Session>,
    sm: Arc<StateMachine>,
    speech_tx: mpsc::Sender<SpeechEvent>,
    dtmf_tx: mpsc::Sender<char>,
    result_rx: tokio::sync::Mutex<mpsc::Receiver<LoopResult>>,
    cancel: CancellationToken,
    done: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
}

/// Runs dialog state machines for active sessions.
pub struct Engine {
    loader: Arc<Loader>,
    hooks: Option<Arc<HookExecutor>>,
    publisher: Option<Arc<Publisher>>,
    pool: TaskPool,
    speak: Option<SpeakFn>,
    sessions: RwLock<HashMap<String, Arc<ActiveSession>>>,
}

enum Step {
    Continue,
    Exit,
}

impl Engine {
    pub fn new(
        loader: Arc<Loader>,
        hooks: Option<Arc<HookExecutor>>,
        publisher: Option<Arc<Publisher>>,
        pool: TaskPool,
        speak: Option<SpeakFn>,
    ) -> Arc<Self> {
        Arc::new(Self {
            loader,
            hooks,
            publisher,
            pool,
            speak,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Begin the background session TTL reaper.
    pub fn start_reaper(self: &Arc<Self>, cancel: CancellationToken) {
        let engine = Arc::clone(self);
        self.pool.spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => engine.reap_stale_sessions(),
                }
            }
        });
    }

    fn reap_stale_sessions(&self) {
        let mut sessions = self.sessions.write();
        sessions.retain(|id, active| {
            if active.session.started().elapsed() > SESSION_TTL {
                tracing::warn!(session_id = %id, "reaping stale dialog session");
                active.cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Start a session for a loaded dialog. Duplicate session ids fail.
    ///
    /// Returns the initial state's on-enter actions; engine-local actions
    /// have already been executed.
    pub async fn start_dialog(
        self: &Arc<Self>,
        session_id: &str,
        dialog_name: &str,
        initial_state: Option<&str>,
        variables: HashMap<String, String>,
    ) -> Result<DialogTurn, DialogError> {
        let sm = self
            .loader
            .get(dialog_name)
            .ok_or_else(|| DialogError::DialogNotFound(dialog_name.to_string()))?;

        let session_id = if session_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            session_id.to_string()
        };
        if self.sessions.read().contains_key(&session_id) {
            return Err(DialogError::SessionExists(session_id));
        }

        let initial = initial_state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| sm.initial_state())
            .to_string();
        let state = sm
            .get_state(&initial)
            .cloned()
            .ok_or_else(|| DialogError::StateNotFound {
                dialog: dialog_name.to_string(),
                state: initial.clone(),
            })?;

        let session = Arc::new(Session::new(&session_id, dialog_name, &initial));
        for (k, v) in &sm.dialog().variables {
            session.set_variable(k.clone(), v.clone());
        }
        for (k, v) in variables {
            session.set_variable(k, v);
        }

        self.execute_actions(&session, &state.on_enter).await?;

        let (speech_tx, speech_rx) = mpsc::channel(SPEECH_BUFFER);
        let (dtmf_tx, dtmf_rx) = mpsc::channel(DTMF_BUFFER);
        let (result_tx, result_rx) = mpsc::channel(RESULT_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let active = Arc::new(ActiveSession {
            session: Arc::clone(&session),
            sm,
            speech_tx,
            dtmf_tx,
            result_rx: tokio::sync::Mutex::new(result_rx),
            cancel,
            done: tokio::sync::Mutex::new(Some(done_rx)),
        });

        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&session_id) {
                return Err(DialogError::SessionExists(session_id));
            }
            sessions.insert(session_id.clone(), Arc::clone(&active));
        }

        let engine = Arc::clone(self);
        let loop_active = Arc::clone(&active);
        self.pool.spawn(async move {
            engine
                .run_session_loop(loop_active, speech_rx, dtmf_rx, result_tx)
                .await;
            let _ = done_tx.send(());
        });

        tracing::info!(session_id = %session_id, dialog = %dialog_name, "dialog started");

        Ok(DialogTurn {
            session_id,
            previous_state: String::new(),
            current_state: initial,
            terminal: state.terminal,
            actions: state.on_enter,
        })
    }

    /// Deliver a speech or DTMF event and wait for the loop's result.
    ///
    /// A full input channel fails after 5 s with `Busy`; a missing result
    /// fails after 10 s with `DeadlineExceeded`.
    pub async fn send_event(
        &self,
        session_id: &str,
        event_type: &str,
        data: &str,
    ) -> Result<DialogTurn, DialogError> {
        let active = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| DialogError::SessionNotFound(session_id.to_string()))?;

        let previous_state = active.session.current_state();

        match event_type {
            "speech" => {
                let event = SpeechEvent {
                    text: data.to_string(),
                    is_final: true,
                };
                active
                    .speech_tx
                    .send_timeout(event, SEND_WAIT)
                    .await
                    .map_err(|_| DialogError::Busy("speech"))?;
            }
            "dtmf" => {
                let digit = data
                    .chars()
                    .next()
                    .ok_or_else(|| DialogError::UnsupportedEvent("empty dtmf".into()))?;
                active
                    .dtmf_tx
                    .send_timeout(digit, SEND_WAIT)
                    .await
                    .map_err(|_| DialogError::Busy("dtmf"))?;
            }
            other => return Err(DialogError::UnsupportedEvent(other.to_string())),
        }

        let mut result_rx = active.result_rx.lock().await;
        let result = tokio::time::timeout(RESULT_WAIT, result_rx.recv())
            .await
            .map_err(|_| DialogError::DeadlineExceeded)?
            .ok_or(DialogError::SessionEnded)?;

        if let Some(error) = result.error {
            return Err(error);
        }

        Ok(DialogTurn {
            session_id: session_id.to_string(),
            previous_state,
            current_state: result.new_state,
            terminal: result.terminal,
            actions: result.actions,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionSnapshot, DialogError> {
        let active = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| DialogError::SessionNotFound(session_id.to_string()))?;
        let session = &active.session;
        Ok(SessionSnapshot {
            session_id: session.id().to_string(),
            dialog_name: session.dialog_name().to_string(),
            current_state: session.current_state(),
            variables: session.copy_variables(),
            history: session.copy_history(),
            started_at: session.started_at(),
        })
    }

    /// End a session: cancel its loop and wait up to 5 s for it to exit.
    pub async fn end_dialog(&self, session_id: &str) -> Result<(), DialogError> {
        let active = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| DialogError::SessionNotFound(session_id.to_string()))?;

        active.cancel.cancel();
        let done = active.done.lock().await.take();
        if let Some(done) = done {
            if tokio::time::timeout(END_WAIT, done).await.is_err() {
                tracing::warn!(session_id = %session_id, "dialog loop did not exit in time");
            }
        }
        tracing::info!(session_id = %session_id, "dialog ended");
        Ok(())
    }

    pub fn list_dialogs(&self) -> Vec<DialogInfo> {
        self.loader.list()
    }

    pub fn list_sessions(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    async fn run_session_loop(
        self: Arc<Self>,
        active: Arc<ActiveSession>,
        mut speech_rx: mpsc::Receiver<SpeechEvent>,
        mut dtmf_rx: mpsc::Receiver<char>,
        result_tx: mpsc::Sender<LoopResult>,
    ) {
        // One timer reused across states; resetting the deadline guarantees
        // no stale fire is observed.
        let mut timer: Pin<Box<Sleep>> = Box::pin(tokio::time::sleep(Duration::ZERO));

        loop {
            let current = active.session.current_state();
            let Some(state) = active.sm.get_state(&current).cloned() else {
                let _ = result_tx
                    .send(LoopResult::fail(
                        current.clone(),
                        DialogError::StateNotFound {
                            dialog: active.session.dialog_name().to_string(),
                            state: current,
                        },
                    ))
                    .await;
                return;
            };

            if state.terminal {
                let _ = result_tx
                    .send(LoopResult {
                        new_state: current,
                        terminal: true,
                        actions: Vec::new(),
                        error: None,
                    })
                    .await;
                return;
            }

            let timeout = state
                .timeout
                .as_deref()
                .and_then(parse_duration);
            if let Some(dur) = timeout {
                timer
                    .as_mut()
                    .reset(tokio::time::Instant::now() + dur);
            }

            enum Input {
                Speech(SpeechEvent),
                Dtmf(char),
                Timeout,
                Stop,
            }

            let input = tokio::select! {
                _ = active.cancel.cancelled() => Input::Stop,
                event = speech_rx.recv() => event.map(Input::Speech).unwrap_or(Input::Stop),
                digit = dtmf_rx.recv() => digit.map(Input::Dtmf).unwrap_or(Input::Stop),
                _ = timer.as_mut(), if timeout.is_some() => Input::Timeout,
            };

            match input {
                Input::Stop => return,
                Input::Speech(event) => {
                    if !event.is_final {
                        continue;
                    }
                    active.session.set_last_event(event.text.clone());
                    match self
                        .apply_event(&active, &state, "speech", &event.text, &result_tx)
                        .await
                    {
                        Step::Continue => {}
                        Step::Exit => return,
                    }
                }
                Input::Dtmf(digit) => {
                    let trigger = digit.to_string();
                    active.session.set_last_event(trigger.clone());
                    match self
                        .apply_event(&active, &state, "dtmf", &trigger, &result_tx)
                        .await
                    {
                        Step::Continue => {}
                        Step::Exit => return,
                    }
                }
                Input::Timeout => {
                    let Some(next) = state.timeout_next.clone() else {
                        continue;
                    };
                    let from = active.session.current_state();
                    active.session.record_transition(&from, &next, "timeout");
                    self.emit_transition(&active.session, &from, &next, "timeout")
                        .await;

                    let Some(new_state) = active.sm.get_state(&next).cloned() else {
                        continue;
                    };
                    if let Err(err) = self
                        .execute_actions(&active.session, &new_state.on_enter)
                        .await
                    {
                        let _ = result_tx.send(LoopResult::fail(next, err)).await;
                        return;
                    }
                    let _ = result_tx
                        .send(LoopResult {
                            new_state: next,
                            terminal: new_state.terminal,
                            actions: new_state.on_enter,
                            error: None,
                        })
                        .await;
                }
            }
        }
    }

    async fn apply_event(
        self: &Arc<Self>,
        active: &ActiveSession,
        state: &State,
        event_name: &str,
        trigger: &str,
        result_tx: &mpsc::Sender<LoopResult>,
    ) -> Step {
        let session = &active.session;

        let evaluated = active.sm.evaluate_transitions(state, event_name, session);
        match evaluated {
            Err(err) => {
                let _ = result_tx
                    .send(LoopResult::fail(session.current_state(), err))
                    .await;
                Step::Exit
            }
            Ok(None) => {
                let _ = result_tx.send(LoopResult::stay(session.current_state())).await;
                Step::Continue
            }
            Ok(Some((target, transition_actions))) => {
                let from = session.current_state();
                session.record_transition(&from, &target, trigger);
                self.emit_transition(session, &from, &target, trigger).await;

                let Some(new_state) = active.sm.get_state(&target).cloned() else {
                    let err = DialogError::StateNotFound {
                        dialog: session.dialog_name().to_string(),
                        state: target.clone(),
                    };
                    let _ = result_tx.send(LoopResult::fail(target, err)).await;
                    return Step::Exit;
                };

                let mut actions = transition_actions;
                actions.extend(new_state.on_enter.iter().cloned());

                if let Err(err) = self.execute_actions(session, &actions).await {
                    let _ = result_tx.send(LoopResult::fail(target, err)).await;
                    return Step::Exit;
                }

                let _ = result_tx
                    .send(LoopResult {
                        new_state: target,
                        terminal: new_state.terminal,
                        actions,
                        error: None,
                    })
                    .await;
                Step::Continue
            }
        }
    }

    async fn emit_transition(&self, session: &Session, from: &str, to: &str, trigger: &str) {
        if let Some(publisher) = &self.publisher {
            let _ = publisher
                .emit(
                    EventType::StateTransition,
                    session.id(),
                    &StateTransitionData {
                        from_state: from.to_string(),
                        to_state: to.to_string(),
                        trigger_event: trigger.to_string(),
                        dialog_name: session.dialog_name().to_string(),
                    },
                )
                .await;
        }
    }

    /// Execute engine-local action semantics. Media actions (`play_tts`
    /// without a speak function, `play_audio`, `hangup`) are carried in the
    /// returned action list for the caller to execute.
    pub(crate) async fn execute_actions(
        &self,
        session: &Arc<Session>,
        actions: &[Action],
    ) -> Result<(), DialogError> {
        for action in actions {
            self.execute_action(session, action).await?;
        }
        Ok(())
    }

    async fn execute_action(
        &self,
        session: &Arc<Session>,
        action: &Action,
    ) -> Result<(), DialogError> {
        match action.action_type {
            ActionType::PlayTts => {
                let ctx = session.template_context();
                let text = render_param(action.param("text").unwrap_or(""), &ctx)?;
                if let Some(speak) = &self.speak {
                    speak(&text);
                }
            }
            ActionType::CallHook => {
                if let Some(hooks) = &self.hooks {
                    let cfg = HookConfig {
                        url: action.param("url").unwrap_or("").to_string(),
                        auth_type: action.param("auth_type").unwrap_or("none").to_string(),
                        auth_secret: action.param("auth_secret").unwrap_or("").to_string(),
                        timeout_sec: action
                            .param("timeout_sec")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(DEFAULT_HOOK_TIMEOUT_SEC),
                        headers: HashMap::new(),
                    };
                    let req = HookRequest {
                        session_id: session.id().to_string(),
                        state: session.current_state(),
                        event: session.last_event(),
                        variables: session.copy_variables(),
                        transcript: None,
                        digit: None,
                    };
                    match hooks.execute(&cfg, &req).await {
                        Ok(resp) => {
                            for (k, v) in resp.variables {
                                session.set_variable(k, v);
                            }
                            session.set_last_result(resp.data);
                        }
                        // Hook errors are non-fatal; the executor emitted
                        // hook.error already.
                        Err(err) => {
                            tracing::debug!(session_id = %session.id(), error = %err, "hook failed")
                        }
                    }
                }
            }
            ActionType::SetVariable => {
                for (key, value) in &action.params {
                    let ctx = session.template_context();
                    let rendered = render_param(value, &ctx)?;
                    session.set_variable(key.clone(), rendered);
                }
            }
            // Signalled to the caller through the returned action list.
            ActionType::Hangup => {}
            // Reserved; no-op in the engine.
            ActionType::PlayAudio => {}
        }

        if let Some(publisher) = &self.publisher {
            let _ = publisher
                .emit(
                    EventType::ActionExecuted,
                    session.id(),
                    &ActionExecutedData {
                        action_type: action.action_type.as_str().to_string(),
                        params: action.params.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }
}
