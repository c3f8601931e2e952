//! API request and response types

use crate::runtime::SessionSnapshot;
use crate::state_machine::EventType;
use serde::{Deserialize, Serialize};

/// One option of the intake category selector
#[derive(Debug, Serialize)]
pub struct EventTypeChoice {
    pub value: EventType,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventTypesResponse {
    pub event_types: Vec<EventTypeChoice>,
}

/// Intake form submission. Missing fields are treated as unanswered.
#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub key_fact: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeResponse {
    Started {
        greeting: String,
        session: SessionSnapshot,
    },
    Incomplete {
        message: &'static str,
        session: SessionSnapshot,
    },
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChatResponse {
    Replied {
        reply: String,
        session: SessionSnapshot,
    },
    Blocked {
        warning: String,
        session: SessionSnapshot,
    },
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: SessionSnapshot,
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
