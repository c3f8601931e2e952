//! Events that can occur in a session

use super::state::EventType;
use crate::moderation::Verdict;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    IntakeSubmitted {
        event_type: EventType,
        key_fact: String,
    },
    UserMessage {
        text: String,
    },

    // Moderation events
    Screened {
        verdict: Verdict,
    },

    // Reply events
    ReplyReceived {
        text: String,
    },
    ReplyFailed {
        message: String,
    },

    // Recovery: the caller driving the previous turn went away mid-flight
    TurnAbandoned,
}
