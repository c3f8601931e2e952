//! Direct-chat protocol: one blocking completion call per turn

use super::{ProtocolKind, ReplyContext, ReplyError, ReplyProtocol};
use crate::llm::{CompletionApi, CompletionRequest, Role, ThreadId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Fixed request parameters for the completion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct DirectChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for DirectChatSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 400,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct DirectChat {
    api: Arc<dyn CompletionApi>,
    settings: DirectChatSettings,
}

impl DirectChat {
    pub fn new(api: Arc<dyn CompletionApi>, settings: DirectChatSettings) -> Self {
        Self { api, settings }
    }
}

#[async_trait]
impl ReplyProtocol for DirectChat {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::DirectChat
    }

    async fn open_thread(&self) -> Result<Option<ThreadId>, ReplyError> {
        Ok(None)
    }

    async fn mirror(
        &self,
        _thread: &ThreadId,
        _role: Role,
        _content: &str,
    ) -> Result<(), ReplyError> {
        // The full history travels with every request
        Ok(())
    }

    async fn get_reply(&self, context: ReplyContext<'_>) -> Result<String, ReplyError> {
        if context.history.is_empty() {
            return Err(ReplyError::EmptyHistory);
        }

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: context.history.to_vec(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            timeout: self.settings.timeout,
        };

        let completion = self.api.complete(&request).await?;
        tracing::debug!(
            model = %self.settings.model,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "Completion usage"
        );
        Ok(completion.content.trim().to_string())
    }
}
