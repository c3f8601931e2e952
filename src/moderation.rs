//! Moderation gate
//!
//! Screens user text with the remote classifier before it enters the
//! conversation. The gate fails open: only an explicit flag from a
//! successful call blocks a message.

use crate::llm::{LlmError, ModerationApi};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_MODERATION_MODEL: &str = "text-moderation-latest";
pub const DEFAULT_MODERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Why the classifier gave no usable answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndeterminateCause {
    Transport(String),
    TimedOut,
    Malformed,
}

impl fmt::Display for IndeterminateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndeterminateCause::Transport(message) => write!(f, "transport error: {message}"),
            IndeterminateCause::TimedOut => f.write_str("timed out"),
            IndeterminateCause::Malformed => f.write_str("malformed response"),
        }
    }
}

/// Outcome of screening one text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Flagged,
    Clear,
    /// The classifier could not be consulted; treated as clear
    Indeterminate(IndeterminateCause),
}

impl Verdict {
    /// Whether the text may enter the conversation
    pub fn allows(&self) -> bool {
        match self {
            Verdict::Flagged => false,
            Verdict::Clear | Verdict::Indeterminate(_) => true,
        }
    }
}

/// Remote content classification with a timeout
#[derive(Clone)]
pub struct ModerationGate {
    api: Arc<dyn ModerationApi>,
    model: String,
    timeout: Duration,
}

impl ModerationGate {
    pub fn new(api: Arc<dyn ModerationApi>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api,
            model: model.into(),
            timeout,
        }
    }

    /// Classify `text`, folding every failure into `Verdict::Indeterminate`
    pub async fn screen(&self, text: &str) -> Verdict {
        let verdict = match timeout(self.timeout, self.api.classify(text, &self.model)).await {
            Ok(Ok(response)) => match response.results.first() {
                Some(result) if result.flagged => Verdict::Flagged,
                Some(_) => Verdict::Clear,
                None => Verdict::Indeterminate(IndeterminateCause::Malformed),
            },
            Ok(Err(LlmError { message, .. })) => {
                Verdict::Indeterminate(IndeterminateCause::Transport(message))
            }
            Err(_) => Verdict::Indeterminate(IndeterminateCause::TimedOut),
        };

        match &verdict {
            Verdict::Flagged => tracing::info!(model = %self.model, "Moderation flagged user text"),
            Verdict::Clear => tracing::debug!(model = %self.model, "Moderation passed"),
            Verdict::Indeterminate(cause) => tracing::warn!(
                model = %self.model,
                cause = %cause,
                "Moderation unavailable, allowing message"
            ),
        }

        verdict
    }

    /// `false` only when the classifier explicitly flagged the text
    #[cfg(test)]
    pub async fn is_safe(&self, text: &str) -> bool {
        self.screen(text).await.allows()
    }
}
