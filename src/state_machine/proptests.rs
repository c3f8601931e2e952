//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::transition::*;
use super::*;
use crate::llm::Role;
use crate::moderation::{IndeterminateCause, Verdict};
use crate::reply::ProtocolKind;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn context(protocol: ProtocolKind) -> SessionContext {
    SessionContext::new("prop-session", protocol)
}

/// Minimal model of what the runtime does with effects
#[derive(Debug, Default)]
struct Model {
    history: Vec<(Role, String)>,
    intake_complete: bool,
    activations: u32,
}

impl Model {
    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::AppendMessage { role, content } => {
                    self.history.push((*role, content.clone()));
                }
                Effect::ActivateSession => {
                    self.intake_complete = true;
                    self.activations += 1;
                }
                Effect::ResetIntake => self.history.clear(),
                _ => {}
            }
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_protocol() -> impl Strategy<Value = ProtocolKind> {
    prop_oneof![Just(ProtocolKind::DirectChat), Just(ProtocolKind::ThreadedJob)]
}

fn arb_event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::Unset),
        Just(EventType::BreakUp),
        Just(EventType::Bereavement),
    ]
}

fn arb_verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Flagged),
        Just(Verdict::Clear),
        Just(Verdict::Indeterminate(IndeterminateCause::TimedOut)),
        Just(Verdict::Indeterminate(IndeterminateCause::Malformed)),
        "[a-z ]{0,10}".prop_map(|m| Verdict::Indeterminate(IndeterminateCause::Transport(m))),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (arb_event_type(), "[a-z ]{0,12}").prop_map(|(event_type, key_fact)| {
            Event::IntakeSubmitted {
                event_type,
                key_fact,
            }
        }),
        "[a-zA-Z ]{0,20}".prop_map(|text| Event::UserMessage { text }),
        arb_verdict().prop_map(|verdict| Event::Screened { verdict }),
        "[a-zA-Z ]{0,20}".prop_map(|text| Event::ReplyReceived { text }),
        "[a-z]{1,10}".prop_map(|message| Event::ReplyFailed { message }),
        Just(Event::TurnAbandoned),
    ]
}

fn arb_busy_state() -> impl Strategy<Value = SessionState> {
    prop_oneof![
        Just(SessionState::Greeting),
        Just(SessionState::Replying),
        "[a-z]{1,10}".prop_map(|text| SessionState::Screening { text }),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    // User text only enters the history right after an allowing verdict
    #[test]
    fn prop_user_append_requires_allowing_verdict(
        protocol in arb_protocol(),
        events in proptest::collection::vec(arb_event(), 0..30),
    ) {
        let ctx = context(protocol);
        let mut state = SessionState::AwaitingIntake;

        for event in events {
            let allowed = matches!(&event, Event::Screened { verdict } if verdict.allows());
            let screening = match &state {
                SessionState::Screening { text } => Some(text.clone()),
                _ => None,
            };
            if let Ok(result) = transition(&state, &ctx, event) {
                for effect in &result.effects {
                    if let Effect::AppendMessage { role: Role::User, content } = effect {
                        prop_assert!(allowed, "user append without allowing verdict");
                        prop_assert_eq!(Some(content), screening.as_ref());
                    }
                }
                state = result.new_state;
            }
        }
    }

    // The session activates at most once, always with a non-empty greeting first
    #[test]
    fn prop_intake_activates_once(
        protocol in arb_protocol(),
        events in proptest::collection::vec(arb_event(), 0..40),
    ) {
        let ctx = context(protocol);
        let mut state = SessionState::AwaitingIntake;
        let mut model = Model::default();

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                let activating = result.effects.contains(&Effect::ActivateSession);
                model.apply(&result.effects);
                state = result.new_state;

                if activating {
                    let first_assistant = model
                        .history
                        .iter()
                        .find(|(role, _)| *role == Role::Assistant);
                    prop_assert!(
                        matches!(first_assistant, Some((_, text)) if !text.trim().is_empty()),
                        "activation without greeting: {:?}",
                        model.history
                    );
                }
            }
            prop_assert!(model.activations <= 1);
            prop_assert_eq!(model.intake_complete, model.activations == 1);
        }
    }

    // Reply requests only leave from states waiting for a reply
    #[test]
    fn prop_reply_requested_only_when_waiting(
        protocol in arb_protocol(),
        events in proptest::collection::vec(arb_event(), 0..30),
    ) {
        let ctx = context(protocol);
        let mut state = SessionState::AwaitingIntake;

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                if result.effects.contains(&Effect::RequestReply) {
                    prop_assert!(
                        matches!(result.new_state, SessionState::Greeting | SessionState::Replying),
                        "RequestReply into {:?}",
                        result.new_state
                    );
                }
                let mirrors = result
                    .effects
                    .iter()
                    .any(|e| matches!(
                        e,
                        Effect::MirrorToThread { .. } | Effect::PrimeThread { .. } | Effect::OpenThread
                    ));
                if protocol == ProtocolKind::DirectChat {
                    prop_assert!(!mirrors, "direct chat touched a thread");
                }
                state = result.new_state;
            }
        }
    }

    // Overlapping turns are refused
    #[test]
    fn prop_busy_rejects_messages(state in arb_busy_state(), text in "[a-z]{1,10}") {
        let result = transition(&state, &context(ProtocolKind::DirectChat), Event::UserMessage { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
    }

    // An abandoned busy state always settles somewhere a new request is accepted
    #[test]
    fn prop_abandoned_turn_settles(state in arb_busy_state(), protocol in arb_protocol()) {
        let result = transition(&state, &context(protocol), Event::TurnAbandoned).unwrap();
        prop_assert!(!result.new_state.is_busy());
        prop_assert!(!result.effects.contains(&Effect::RequestReply));
    }

    // Any non-blank message from idle goes to screening with no other effect
    #[test]
    fn prop_idle_screens_messages(text in "[a-zA-Z]{1,30}", protocol in arb_protocol()) {
        let result = transition(&SessionState::Idle, &context(protocol), Event::UserMessage { text: text.clone() });
        let result = result.unwrap();
        prop_assert_eq!(result.effects, vec![Effect::Screen { text: text.clone() }]);
        prop_assert_eq!(result.new_state, SessionState::Screening { text });
    }
}
