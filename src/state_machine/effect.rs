//! Effects produced by state transitions

use super::state::EventType;
use crate::llm::Role;

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Store the accepted intake answers on the session
    RecordIntake {
        event_type: EventType,
        key_fact: String,
    },

    /// Append a message to the local history
    AppendMessage { role: Role, content: String },

    /// Open the remote thread, or reuse the one the session already has
    OpenThread,

    /// Copy a message onto the remote thread
    MirrorToThread { role: Role, content: String },

    /// Post the intake line to the thread unless it already carries it
    PrimeThread { content: String },

    /// Run the moderation gate over user text
    Screen { text: String },

    /// Ask the reply protocol for the next assistant message
    RequestReply,

    /// Mark the intake complete after the greeting arrived
    ActivateSession,

    /// Drop the history and answers of a failed greeting so intake can be
    /// resubmitted
    ResetIntake,

    /// Show a local warning without contacting the model
    Warn { message: String },

    /// Re-render the transcript for connected clients
    Render,
}

impl Effect {
    pub fn append_user(content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn append_assistant(content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn append_system(content: impl Into<String>) -> Self {
        Effect::AppendMessage {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn mirror_user(content: impl Into<String>) -> Self {
        Effect::MirrorToThread {
            role: Role::User,
            content: content.into(),
        }
    }
}
