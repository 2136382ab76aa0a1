//! Per-call session state
//!
//! All mutation goes through one read/write lock; snapshots are deep copies.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::template::TemplateContext;

/// History cap before eviction kicks in.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// One recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub from_state: String,
    pub to_state: String,
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
}

struct SessionInner {
    current_state: String,
    variables: HashMap<String, String>,
    history: Vec<StateRecord>,
    last_event: String,
    last_result: HashMap<String, serde_json::Value>,
}

/// Mutable per-call state.
pub struct Session {
    id: String,
    dialog_name: String,
    started: Instant,
    started_at: DateTime<Utc>,
    max_history: usize,
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        dialog_name: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            dialog_name: dialog_name.into(),
            started: Instant::now(),
            started_at: Utc::now(),
            max_history: DEFAULT_MAX_HISTORY,
            inner: RwLock::new(SessionInner {
                current_state: initial_state.into(),
                variables: HashMap::new(),
                history: Vec::new(),
                last_event: String::new(),
                last_result: HashMap::new(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_max_history(mut self, cap: usize) -> Self {
        self.max_history = cap.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dialog_name(&self) -> &str {
        &self.dialog_name
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record a transition, atomically updating the current state. When the
    /// history hits the cap, the oldest 10% is evicted.
    pub fn record_transition(&self, from: &str, to: &str, trigger: &str) {
        let mut inner = self.inner.write();
        if inner.history.len() >= self.max_history {
            let evict = (self.max_history / 10).max(1);
            inner.history.drain(..evict);
        }
        inner.history.push(StateRecord {
            from_state: from.to_string(),
            to_state: to.to_string(),
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
        });
        inner.current_state = to.to_string();
    }

    pub fn current_state(&self) -> String {
        self.inner.read().current_state.clone()
    }

    pub fn set_current_state(&self, state: impl Into<String>) {
        self.inner.write().current_state = state.into();
    }

    pub fn set_variable(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().variables.insert(key.into(), value.into());
    }

    pub fn variable(&self, key: &str) -> Option<String> {
        self.inner.read().variables.get(key).cloned()
    }

    pub fn last_event(&self) -> String {
        self.inner.read().last_event.clone()
    }

    pub fn set_last_event(&self, event: impl Into<String>) {
        self.inner.write().last_event = event.into();
    }

    pub fn last_result(&self) -> HashMap<String, serde_json::Value> {
        self.inner.read().last_result.clone()
    }

    pub fn set_last_result(&self, result: HashMap<String, serde_json::Value>) {
        self.inner.write().last_result = result;
    }

    /// Snapshot of all variables.
    pub fn copy_variables(&self) -> HashMap<String, String> {
        self.inner.read().variables.clone()
    }

    /// Snapshot of the transition history.
    pub fn copy_history(&self) -> Vec<StateRecord> {
        self.inner.read().history.clone()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }

    /// Snapshot context for template evaluation.
    pub fn template_context(&self) -> TemplateContext {
        let inner = self.inner.read();
        TemplateContext {
            session_id: self.id.clone(),
            dialog_name: self.dialog_name.clone(),
            current_state: inner.current_state.clone(),
            event: inner.last_event.clone(),
            variables: inner.variables.clone(),
            result: inner.last_result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_transition_updates_state_and_history() {
        let session = Session::new("s1", "test", "a");
        session.record_transition("a", "b", "hi");
        assert_eq!(session.current_state(), "b");
        let history = session.copy_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_state, "a");
        assert_eq!(history[0].to_state, "b");
        assert_eq!(history[0].trigger, "hi");
    }

    #[test]
    fn test_history_eviction_at_cap() {
        let session = Session::new("s1", "test", "a").with_max_history(100);
        for i in 0..100 {
            session.record_transition("a", "b", &format!("t{i}"));
        }
        assert_eq!(session.history_len(), 100);

        // The next record evicts the oldest 10%.
        session.record_transition("b", "c", "overflow");
        assert_eq!(session.history_len(), 91);
        let history = session.copy_history();
        assert_eq!(history[0].trigger, "t10");
        assert_eq!(history.last().unwrap().trigger, "overflow");
    }

    #[test]
    fn test_snapshots_are_copies() {
        let session = Session::new("s1", "test", "a");
        session.set_variable("k", "v");
        let mut vars = session.copy_variables();
        vars.insert("k".into(), "mutated".into());
        assert_eq!(session.variable("k").as_deref(), Some("v"));
    }
}
