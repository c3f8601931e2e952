//! Common types for remote model interactions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Message role, shared by the local history and both wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A `{role, content}` pair as sent to the completion endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Stateless completion request (direct-chat protocol)
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Completion result
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Server-side conversation thread handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side reply job handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reply job status. Only `Pending -> Completed` and `Pending -> Failed`
/// are valid transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// A submitted reply job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyJob {
    pub id: JobId,
    pub status: JobStatus,
}

/// Ordering a remote message listing is returned in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    NewestFirst,
    #[cfg(test)]
    OldestFirst,
}

/// A message stored on a remote thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: Role,
    pub content: String,
}

/// One page of thread messages together with the ordering contract
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub order: MessageOrder,
    pub messages: Vec<ThreadMessage>,
}

impl MessagePage {
    /// Most recently added message with the given role
    pub fn latest(&self, role: Role) -> Option<&ThreadMessage> {
        let mut matching = self.messages.iter().filter(|m| m.role == role);
        match self.order {
            MessageOrder::NewestFirst => matching.next(),
            #[cfg(test)]
            MessageOrder::OldestFirst => matching.next_back(),
        }
    }
}

/// Moderation verdict for one input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationResult {
    pub flagged: bool,
}

/// Moderation endpoint response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationResponse {
    #[serde(default)]
    pub results: Vec<ModerationResult>,
}
