//! Transcript rendering
//!
//! The visible transcript is a pure function of the conversation history.
//! System messages carry the model context and are never shown.

use crate::llm::Role;
use crate::state_machine::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub speaker: &'static str,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
}

fn speaker(role: Role) -> Option<&'static str> {
    match role {
        Role::User => Some("You"),
        Role::Assistant => Some("HeartBuddy"),
        Role::System => None,
    }
}

pub fn render(conversation: &[Message]) -> Transcript {
    let entries = conversation
        .iter()
        .filter_map(|message| {
            speaker(message.role).map(|speaker| TranscriptEntry {
                role: message.role,
                speaker,
                content: message.content.clone(),
                created_at: message.created_at,
            })
        })
        .collect();
    Transcript { entries }
}
