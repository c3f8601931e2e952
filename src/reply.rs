//! Reply protocols
//!
//! The state machine asks one `ReplyProtocol` for every assistant turn.
//! `DirectChat` sends the whole history to a stateless completion
//! endpoint; `ThreadedJob` keeps the history on a server-side thread and
//! waits for an asynchronous job to finish.

mod direct;
mod poll;
mod threaded;

pub use direct::{DirectChat, DirectChatSettings};
pub use poll::PollPolicy;
pub use threaded::ThreadedJob;

use crate::llm::{ChatMessage, LlmError, Role, ThreadId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Shown in place of a reply when the remote job ends in failure
pub const JOB_FAILED_APOLOGY: &str = "Sorry, something went wrong. Let's try again.";

/// Shown in place of a reply when the remote job does not finish in time
pub const JOB_TIMEOUT_APOLOGY: &str =
    "Sorry, I'm taking longer than usual to answer. Could you share that with me again in a moment?";

/// Which reply protocol a session runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    DirectChat,
    ThreadedJob,
}

impl ProtocolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::DirectChat => "direct",
            ProtocolKind::ThreadedJob => "threaded",
        }
    }
}

/// What a protocol gets to produce the next reply.
///
/// `DirectChat` reads `history`; `ThreadedJob` reads `thread`, to which the
/// caller has already mirrored the latest user message.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub history: &'a [ChatMessage],
    pub thread: Option<&'a ThreadId>,
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply request failed: {0}")]
    Transport(#[from] LlmError),
    #[error("no thread is open for this session")]
    MissingThread,
    #[error("cannot request a reply for an empty history")]
    EmptyHistory,
}

impl ReplyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplyError::Transport(e) => e.kind.is_retryable(),
            ReplyError::MissingThread | ReplyError::EmptyHistory => false,
        }
    }
}

/// Capability to obtain assistant replies from the remote model
#[async_trait]
pub trait ReplyProtocol: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Create the server-side thread for a new session; `None` when the
    /// protocol is stateless
    async fn open_thread(&self) -> Result<Option<ThreadId>, ReplyError>;

    /// Copy a message onto the session's remote thread
    async fn mirror(&self, thread: &ThreadId, role: Role, content: &str)
        -> Result<(), ReplyError>;

    async fn get_reply(&self, context: ReplyContext<'_>) -> Result<String, ReplyError>;
}

/// Logging wrapper for reply protocols
pub struct LoggingProtocol {
    inner: Arc<dyn ReplyProtocol>,
}

impl LoggingProtocol {
    pub fn new(inner: Arc<dyn ReplyProtocol>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ReplyProtocol for LoggingProtocol {
    fn kind(&self) -> ProtocolKind {
        self.inner.kind()
    }

    async fn open_thread(&self) -> Result<Option<ThreadId>, ReplyError> {
        let result = self.inner.open_thread().await;
        match &result {
            Ok(Some(thread)) => tracing::info!(thread = %thread, "Opened remote thread"),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Failed to open remote thread"),
        }
        result
    }

    async fn mirror(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), ReplyError> {
        let result = self.inner.mirror(thread, role, content).await;
        if let Err(e) = &result {
            tracing::error!(thread = %thread, role = role.as_str(), error = %e, "Failed to mirror message");
        }
        result
    }

    async fn get_reply(&self, context: ReplyContext<'_>) -> Result<String, ReplyError> {
        let start = std::time::Instant::now();
        let result = self.inner.get_reply(context).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    protocol = self.kind().as_str(),
                    duration_ms = %duration.as_millis(),
                    history_len = context.history.len(),
                    reply_chars = reply.chars().count(),
                    "Reply request completed"
                );
            }
            Err(e) => {
                let retry_after = match e {
                    ReplyError::Transport(LlmError {
                        retry_after: Some(delay),
                        ..
                    }) => Some(delay.as_secs()),
                    _ => None,
                };
                tracing::error!(
                    protocol = self.kind().as_str(),
                    duration_ms = %duration.as_millis(),
                    error = %e,
                    retryable = e.is_retryable(),
                    retry_after_secs = ?retry_after,
                    "Reply request failed"
                );
            }
        }

        result
    }
}
