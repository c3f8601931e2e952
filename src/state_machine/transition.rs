//! Pure state transition function

use super::{Effect, Event, SessionContext, SessionState};
use crate::persona;
use crate::reply::{ProtocolKind, JOB_FAILED_APOLOGY};
use thiserror::Error;

/// Local warning shown when moderation flags user text
pub const SAFETY_WARNING: &str = "Let's keep the conversation safe for everyone.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Intake needs an event type and a non-empty answer")]
    IncompleteIntake,
    #[error("Intake must be completed before chatting")]
    IntakeRequired,
    #[error("Intake has already been completed")]
    IntakeAlreadyComplete,
    #[error("A reply is still in flight, wait for it before sending another message")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; all I/O is
/// described by the returned effects.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Intake
        // ============================================================
        (
            SessionState::AwaitingIntake,
            Event::IntakeSubmitted {
                event_type,
                key_fact,
            },
        ) => {
            let key_fact = key_fact.trim();
            if !event_type.is_set() || key_fact.is_empty() {
                return Err(TransitionError::IncompleteIntake);
            }

            let opening = match context.protocol {
                ProtocolKind::DirectChat => vec![Effect::append_system(
                    persona::opening_context(event_type, key_fact),
                )],
                ProtocolKind::ThreadedJob => vec![
                    Effect::OpenThread,
                    Effect::PrimeThread {
                        content: persona::intake_line(event_type, key_fact),
                    },
                ],
            };

            Ok(TransitionResult::new(SessionState::Greeting)
                .with_effect(Effect::RecordIntake {
                    event_type,
                    key_fact: key_fact.to_string(),
                })
                .with_effects(opening)
                .with_effect(Effect::RequestReply))
        }

        (SessionState::Greeting, Event::IntakeSubmitted { .. }) => Err(TransitionError::Busy),

        (
            SessionState::Idle | SessionState::Screening { .. } | SessionState::Replying,
            Event::IntakeSubmitted { .. },
        ) => Err(TransitionError::IntakeAlreadyComplete),

        // ============================================================
        // User messages
        // ============================================================
        (SessionState::Idle, Event::UserMessage { text }) => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            Ok(TransitionResult::new(SessionState::Screening { text: text.clone() })
                .with_effect(Effect::Screen { text }))
        }

        (SessionState::AwaitingIntake, Event::UserMessage { .. }) => {
            Err(TransitionError::IntakeRequired)
        }

        (
            SessionState::Greeting | SessionState::Screening { .. } | SessionState::Replying,
            Event::UserMessage { .. },
        ) => Err(TransitionError::Busy),

        // ============================================================
        // Moderation
        // ============================================================
        (SessionState::Screening { text }, Event::Screened { verdict }) => {
            if !verdict.allows() {
                return Ok(TransitionResult::new(SessionState::Idle).with_effect(Effect::Warn {
                    message: SAFETY_WARNING.to_string(),
                }));
            }

            let mirror = match context.protocol {
                ProtocolKind::ThreadedJob => Some(Effect::mirror_user(text.clone())),
                ProtocolKind::DirectChat => None,
            };

            Ok(TransitionResult::new(SessionState::Replying)
                .with_effect(Effect::append_user(text.clone()))
                .with_effects(mirror)
                .with_effect(Effect::Render)
                .with_effect(Effect::RequestReply))
        }

        // ============================================================
        // Replies
        // ============================================================
        (SessionState::Greeting, Event::ReplyReceived { text }) => {
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::append_assistant(non_empty_reply(text)))
                .with_effect(Effect::ActivateSession)
                .with_effect(Effect::Render))
        }

        (SessionState::Replying, Event::ReplyReceived { text }) => {
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::append_assistant(non_empty_reply(text)))
                .with_effect(Effect::Render))
        }

        // Greeting failed: back to the form, the thread (if any) is kept
        (SessionState::Greeting, Event::ReplyFailed { .. }) => {
            Ok(TransitionResult::new(SessionState::AwaitingIntake)
                .with_effect(Effect::ResetIntake)
                .with_effect(Effect::Render))
        }

        // Turn failed: the user message stays, no assistant entry
        (SessionState::Replying, Event::ReplyFailed { .. }) => {
            Ok(TransitionResult::new(SessionState::Idle))
        }

        // ============================================================
        // Abandoned turns
        // ============================================================
        (SessionState::Greeting, Event::TurnAbandoned) => {
            Ok(TransitionResult::new(SessionState::AwaitingIntake)
                .with_effect(Effect::ResetIntake)
                .with_effect(Effect::Render))
        }

        // A user message appended before the drop stays, like a failed turn
        (SessionState::Screening { .. } | SessionState::Replying, Event::TurnAbandoned) => {
            Ok(TransitionResult::new(SessionState::Idle))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

fn non_empty_reply(text: String) -> String {
    if text.trim().is_empty() {
        JOB_FAILED_APOLOGY.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::moderation::{IndeterminateCause, Verdict};
    use crate::state_machine::EventType;

    fn direct() -> SessionContext {
        SessionContext::new("test-session", ProtocolKind::DirectChat)
    }

    fn threaded() -> SessionContext {
        SessionContext::new("test-session", ProtocolKind::ThreadedJob)
    }

    fn intake(event_type: EventType, key_fact: &str) -> Event {
        Event::IntakeSubmitted {
            event_type,
            key_fact: key_fact.to_string(),
        }
    }

    #[test]
    fn test_direct_intake_builds_context_and_requests_greeting() {
        let result = transition(
            &SessionState::AwaitingIntake,
            &direct(),
            intake(EventType::BreakUp, "losing my best friend"),
        )
        .unwrap();

        assert_eq!(result.new_state, SessionState::Greeting);
        assert_eq!(result.effects.len(), 3);
        assert_eq!(
            result.effects[0],
            Effect::RecordIntake {
                event_type: EventType::BreakUp,
                key_fact: "losing my best friend".to_string(),
            }
        );
        match &result.effects[1] {
            Effect::AppendMessage {
                role: Role::System,
                content,
            } => {
                assert!(content.contains("Break-up"));
                assert!(content.contains("losing my best friend"));
            }
            other => panic!("expected system context, got {other:?}"),
        }
        assert_eq!(result.effects[2], Effect::RequestReply);
    }

    #[test]
    fn test_threaded_intake_opens_and_primes_thread() {
        let result = transition(
            &SessionState::AwaitingIntake,
            &threaded(),
            intake(EventType::Bereavement, "  my dad  "),
        )
        .unwrap();

        assert_eq!(
            result.effects,
            vec![
                Effect::RecordIntake {
                    event_type: EventType::Bereavement,
                    key_fact: "my dad".to_string(),
                },
                Effect::OpenThread,
                Effect::PrimeThread {
                    content: "I'm dealing with a Bereavement. What hurts most is: my dad.".into(),
                },
                Effect::RequestReply,
            ]
        );
    }

    #[test]
    fn test_incomplete_intake_rejected() {
        for event in [
            intake(EventType::Unset, "something"),
            intake(EventType::BreakUp, ""),
            intake(EventType::BreakUp, "   \n"),
        ] {
            let err = transition(&SessionState::AwaitingIntake, &direct(), event).unwrap_err();
            assert_eq!(err, TransitionError::IncompleteIntake);
        }
    }

    #[test]
    fn test_intake_after_activation_rejected() {
        let err = transition(
            &SessionState::Idle,
            &direct(),
            intake(EventType::BreakUp, "again"),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::IntakeAlreadyComplete);

        let err = transition(
            &SessionState::Greeting,
            &direct(),
            intake(EventType::BreakUp, "again"),
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::Busy);
    }

    #[test]
    fn test_message_before_intake_rejected() {
        let err = transition(
            &SessionState::AwaitingIntake,
            &direct(),
            Event::UserMessage { text: "hi".into() },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::IntakeRequired);
    }

    #[test]
    fn test_message_while_replying_rejected() {
        for state in [
            SessionState::Greeting,
            SessionState::Replying,
            SessionState::Screening { text: "first".into() },
        ] {
            let err = transition(&state, &direct(), Event::UserMessage { text: "second".into() })
                .unwrap_err();
            assert_eq!(err, TransitionError::Busy);
        }
    }

    #[test]
    fn test_blank_message_rejected() {
        let err = transition(
            &SessionState::Idle,
            &direct(),
            Event::UserMessage { text: "  ".into() },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::EmptyMessage);
    }

    #[test]
    fn test_user_message_is_screened_first() {
        let result = transition(
            &SessionState::Idle,
            &direct(),
            Event::UserMessage { text: "I can't sleep".into() },
        )
        .unwrap();
        assert_eq!(
            result.new_state,
            SessionState::Screening {
                text: "I can't sleep".into()
            }
        );
        assert_eq!(
            result.effects,
            vec![Effect::Screen {
                text: "I can't sleep".into()
            }]
        );
    }

    #[test]
    fn test_flagged_text_warns_without_appending() {
        let result = transition(
            &SessionState::Screening { text: "bad".into() },
            &threaded(),
            Event::Screened {
                verdict: Verdict::Flagged,
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::Idle);
        assert_eq!(
            result.effects,
            vec![Effect::Warn {
                message: SAFETY_WARNING.to_string()
            }]
        );
    }

    #[test]
    fn test_indeterminate_verdict_is_allowed() {
        let result = transition(
            &SessionState::Screening { text: "hello".into() },
            &direct(),
            Event::Screened {
                verdict: Verdict::Indeterminate(IndeterminateCause::TimedOut),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::Replying);
        assert_eq!(
            result.effects,
            vec![Effect::append_user("hello"), Effect::Render, Effect::RequestReply]
        );
    }

    #[test]
    fn test_threaded_turn_mirrors_before_reply() {
        let result = transition(
            &SessionState::Screening { text: "hello".into() },
            &threaded(),
            Event::Screened {
                verdict: Verdict::Clear,
            },
        )
        .unwrap();
        assert_eq!(
            result.effects,
            vec![
                Effect::append_user("hello"),
                Effect::mirror_user("hello"),
                Effect::Render,
                Effect::RequestReply,
            ]
        );
    }

    #[test]
    fn test_greeting_activates_session() {
        let result = transition(
            &SessionState::Greeting,
            &direct(),
            Event::ReplyReceived {
                text: "Hi, I'm here.".into(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::Idle);
        assert_eq!(
            result.effects,
            vec![
                Effect::append_assistant("Hi, I'm here."),
                Effect::ActivateSession,
                Effect::Render,
            ]
        );
    }

    #[test]
    fn test_blank_reply_replaced_with_apology() {
        let result = transition(
            &SessionState::Replying,
            &direct(),
            Event::ReplyReceived { text: " ".into() },
        )
        .unwrap();
        assert_eq!(result.effects[0], Effect::append_assistant(JOB_FAILED_APOLOGY));
    }

    #[test]
    fn test_failed_greeting_rolls_back_to_intake() {
        let result = transition(
            &SessionState::Greeting,
            &threaded(),
            Event::ReplyFailed {
                message: "network".into(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::AwaitingIntake);
        assert_eq!(result.effects, vec![Effect::ResetIntake, Effect::Render]);
    }

    #[test]
    fn test_failed_turn_returns_to_idle() {
        let result = transition(
            &SessionState::Replying,
            &direct(),
            Event::ReplyFailed {
                message: "network".into(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, SessionState::Idle);
        assert!(result.effects.is_empty());
    }

    #[test]
    fn test_abandoned_greeting_reopens_intake() {
        let result =
            transition(&SessionState::Greeting, &threaded(), Event::TurnAbandoned).unwrap();
        assert_eq!(result.new_state, SessionState::AwaitingIntake);
        assert_eq!(result.effects, vec![Effect::ResetIntake, Effect::Render]);
    }

    #[test]
    fn test_abandoned_turn_returns_to_idle() {
        for state in [
            SessionState::Replying,
            SessionState::Screening {
                text: "hello".into(),
            },
        ] {
            let result = transition(&state, &direct(), Event::TurnAbandoned).unwrap();
            assert_eq!(result.new_state, SessionState::Idle);
            assert!(result.effects.is_empty());
        }
    }

    #[test]
    fn test_nothing_to_abandon_when_settled() {
        for state in [SessionState::AwaitingIntake, SessionState::Idle] {
            assert!(matches!(
                transition(&state, &direct(), Event::TurnAbandoned),
                Err(TransitionError::InvalidTransition(_))
            ));
        }
    }

    #[test]
    fn test_stray_events_are_invalid() {
        let err = transition(
            &SessionState::Idle,
            &direct(),
            Event::ReplyReceived { text: "late".into() },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));
    }
}
