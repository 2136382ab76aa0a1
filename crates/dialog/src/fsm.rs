//! FSM validation and transition evaluation

use crate::session::Session;
use crate::template::eval_condition;
use crate::types::{Action, Dialog, DialogInfo, State};
use crate::DialogError;

/// Validated access to a dialog's states.
pub struct StateMachine {
    dialog: Dialog,
}

impl StateMachine {
    pub fn new(dialog: Dialog) -> Self {
        Self { dialog }
    }

    /// Check the dialog definition for consistency: the initial state and
    /// every transition target / timeout_next must name an existing state.
    pub fn validate(&self) -> Result<(), DialogError> {
        let name = &self.dialog.name;
        if self.dialog.initial_state.is_empty() {
            return Err(DialogError::Validation {
                dialog: name.clone(),
                message: "initial_state is required".into(),
            });
        }
        if !self.dialog.states.contains_key(&self.dialog.initial_state) {
            return Err(DialogError::Validation {
                dialog: name.clone(),
                message: format!(
                    "initial_state {:?} not found in states",
                    self.dialog.initial_state
                ),
            });
        }

        for (state_name, state) in &self.dialog.states {
            for (i, t) in state.transitions.iter().enumerate() {
                if t.target.is_empty() {
                    return Err(DialogError::Validation {
                        dialog: name.clone(),
                        message: format!("state {state_name:?} transition {i}: target is required"),
                    });
                }
                if !self.dialog.states.contains_key(&t.target) {
                    return Err(DialogError::Validation {
                        dialog: name.clone(),
                        message: format!(
                            "state {state_name:?} transition {i}: target {:?} not found",
                            t.target
                        ),
                    });
                }
            }
            if let Some(next) = &state.timeout_next {
                if !self.dialog.states.contains_key(next) {
                    return Err(DialogError::Validation {
                        dialog: name.clone(),
                        message: format!("state {state_name:?}: timeout_next {next:?} not found"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get_state(&self, name: &str) -> Option<&State> {
        self.dialog.states.get(name)
    }

    pub fn initial_state(&self) -> &str {
        &self.dialog.initial_state
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    pub fn info(&self) -> DialogInfo {
        DialogInfo {
            name: self.dialog.name.clone(),
            version: self.dialog.version.clone(),
            description: self.dialog.description.clone(),
            initial_state: self.dialog.initial_state.clone(),
            states: self.dialog.states.keys().cloned().collect(),
        }
    }

    /// Evaluate transitions for the incoming event, in declaration order.
    /// The first transition whose condition holds wins.
    pub fn evaluate_transitions(
        &self,
        state: &State,
        event: &str,
        session: &Session,
    ) -> Result<Option<(String, Vec<Action>)>, DialogError> {
        let ctx = session.template_context();
        for t in &state.transitions {
            if t.event != event {
                continue;
            }
            if eval_condition(t.condition.as_deref().unwrap_or(""), &ctx)? {
                return Ok(Some((t.target.clone(), t.actions.clone())));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transition;
    use std::collections::HashMap;

    fn two_state_dialog() -> Dialog {
        Dialog {
            name: "test".into(),
            initial_state: "a".into(),
            states: HashMap::from([
                (
                    "a".to_string(),
                    State {
                        transitions: vec![
                            Transition {
                                event: "speech".into(),
                                condition: Some("{{ eq .Event \"next\" }}".into()),
                                target: "b".into(),
                                actions: vec![],
                            },
                            Transition {
                                event: "speech".into(),
                                condition: None,
                                target: "a".into(),
                                actions: vec![],
                            },
                        ],
                        ..State::default()
                    },
                ),
                ("b".to_string(), State::default()),
            ]),
            ..Dialog::default()
        }
    }

    #[test]
    fn test_validate_accepts_consistent_dialog() {
        StateMachine::new(two_state_dialog()).validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_initial_state() {
        let mut dialog = two_state_dialog();
        dialog.initial_state = "nope".into();
        assert!(StateMachine::new(dialog).validate().is_err());

        let mut dialog = two_state_dialog();
        dialog.initial_state = String::new();
        assert!(StateMachine::new(dialog).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let mut dialog = two_state_dialog();
        dialog
            .states
            .get_mut("a")
            .unwrap()
            .transitions
            .push(Transition {
                event: "speech".into(),
                condition: None,
                target: "ghost".into(),
                actions: vec![],
            });
        assert!(StateMachine::new(dialog).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_timeout_next() {
        let mut dialog = two_state_dialog();
        dialog.states.get_mut("a").unwrap().timeout_next = Some("ghost".into());
        assert!(StateMachine::new(dialog).validate().is_err());
    }

    #[test]
    fn test_transition_declaration_order_first_match_wins() {
        let sm = StateMachine::new(two_state_dialog());
        let session = Session::new("s1", "test", "a");
        let state = sm.get_state("a").unwrap().clone();

        session.set_last_event("next");
        let (target, _) = sm
            .evaluate_transitions(&state, "speech", &session)
            .unwrap()
            .unwrap();
        assert_eq!(target, "b");

        // The conditional transition fails, the unconditional one matches.
        session.set_last_event("anything else");
        let (target, _) = sm
            .evaluate_transitions(&state, "speech", &session)
            .unwrap()
            .unwrap();
        assert_eq!(target, "a");

        // Wrong event type: no transition at all.
        assert!(sm
            .evaluate_transitions(&state, "dtmf", &session)
            .unwrap()
            .is_none());
    }
}
