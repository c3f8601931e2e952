//! Session state types

use crate::llm::{ChatMessage, Role, ThreadId};
use crate::reply::ProtocolKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intake event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[default]
    Unset,
    BreakUp,
    Bereavement,
}

impl EventType {
    /// Categories offered on the intake form
    pub const CHOICES: [EventType; 2] = [EventType::BreakUp, EventType::Bereavement];

    pub fn label(self) -> &'static str {
        match self {
            EventType::Unset => "Select...",
            EventType::BreakUp => "Break-up",
            EventType::Bereavement => "Bereavement",
        }
    }

    pub fn is_set(self) -> bool {
        self != EventType::Unset
    }
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}

/// Coarse lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    AwaitingIntake,
    Active,
}

/// Session state. Every state except `AwaitingIntake` belongs to the
/// active phase; none is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for a complete intake form
    #[default]
    AwaitingIntake,

    /// Intake accepted, greeting request in flight
    Greeting,

    /// Ready for the next user message
    Idle,

    /// User text is being checked by the moderation gate
    Screening { text: String },

    /// Moderated user message appended, reply request in flight
    Replying,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::AwaitingIntake => SessionPhase::AwaitingIntake,
            SessionState::Greeting
            | SessionState::Idle
            | SessionState::Screening { .. }
            | SessionState::Replying => SessionPhase::Active,
        }
    }

    /// Whether a remote call is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Greeting | SessionState::Screening { .. } | SessionState::Replying
        )
    }
}

/// Immutable configuration of a session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub protocol: ProtocolKind,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, protocol: ProtocolKind) -> Self {
        Self {
            session_id: session_id.into(),
            protocol,
        }
    }
}

/// Everything known about one chat session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub intake_complete: bool,
    pub event_type: EventType,
    pub key_fact: String,
    pub conversation: Vec<Message>,
    pub thread_ref: Option<ThreadId>,
    /// Intake line already posted to `thread_ref`
    pub thread_primer: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::AwaitingIntake,
            intake_complete: false,
            event_type: EventType::Unset,
            key_fact: String::new(),
            conversation: Vec::new(),
            thread_ref: None,
            thread_primer: None,
        }
    }

    /// History in the shape the completion endpoint expects
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.conversation.iter().map(Message::to_chat).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_mapping() {
        assert_eq!(SessionState::AwaitingIntake.phase(), SessionPhase::AwaitingIntake);
        assert_eq!(SessionState::Greeting.phase(), SessionPhase::Active);
        assert_eq!(SessionState::Idle.phase(), SessionPhase::Active);
        assert_eq!(SessionState::Replying.phase(), SessionPhase::Active);
        assert!(!SessionState::Idle.is_busy());
        assert!(SessionState::Screening { text: "x".into() }.is_busy());
    }

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(serde_json::to_string(&EventType::BreakUp).unwrap(), "\"break_up\"");
        let parsed: EventType = serde_json::from_str("\"bereavement\"").unwrap();
        assert_eq!(parsed, EventType::Bereavement);
        assert!(!EventType::Unset.is_set());
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_value(SessionState::Screening { text: "hi".into() }).unwrap();
        assert_eq!(json["type"], "screening");
        assert_eq!(json["text"], "hi");
    }
}
