//! Remote model API abstraction
//!
//! Three narrow capabilities of the hosted API: stateless completions,
//! the threaded job API and content moderation. `OpenAIClient` implements
//! all of them; tests substitute in-memory fakes.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAIClient, DEFAULT_BASE_URL};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Stateless request/response completions
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Threaded job API: durable server-side threads and asynchronous runs
#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadId, LlmError>;

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), LlmError>;

    /// Start a reply job for `assistant_id` on the thread
    async fn create_job(&self, thread: &ThreadId, assistant_id: &str)
        -> Result<ReplyJob, LlmError>;

    async fn get_job(&self, thread: &ThreadId, job: &JobId) -> Result<ReplyJob, LlmError>;

    async fn list_messages(&self, thread: &ThreadId) -> Result<MessagePage, LlmError>;
}

/// Content classification
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn classify(&self, text: &str, model: &str) -> Result<ModerationResponse, LlmError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CompletionApi + ?Sized> CompletionApi for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: ThreadApi + ?Sized> ThreadApi for Arc<T> {
    async fn create_thread(&self) -> Result<ThreadId, LlmError> {
        (**self).create_thread().await
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), LlmError> {
        (**self).post_message(thread, role, content).await
    }

    async fn create_job(
        &self,
        thread: &ThreadId,
        assistant_id: &str,
    ) -> Result<ReplyJob, LlmError> {
        (**self).create_job(thread, assistant_id).await
    }

    async fn get_job(&self, thread: &ThreadId, job: &JobId) -> Result<ReplyJob, LlmError> {
        (**self).get_job(thread, job).await
    }

    async fn list_messages(&self, thread: &ThreadId) -> Result<MessagePage, LlmError> {
        (**self).list_messages(thread).await
    }
}

#[async_trait]
impl<T: ModerationApi + ?Sized> ModerationApi for Arc<T> {
    async fn classify(&self, text: &str, model: &str) -> Result<ModerationResponse, LlmError> {
        (**self).classify(text, model).await
    }
}
