//! Threaded-job protocol
//!
//! The conversation lives on a remote thread. Each turn starts a reply
//! job, waits for it to leave `Pending`, then reads the newest assistant
//! message back from the thread.

use super::poll::{wait_for_terminal, PollError, PollPolicy};
use super::{
    ProtocolKind, ReplyContext, ReplyError, ReplyProtocol, JOB_FAILED_APOLOGY,
    JOB_TIMEOUT_APOLOGY,
};
use crate::llm::{JobStatus, Role, ThreadApi, ThreadId};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ThreadedJob {
    api: Arc<dyn ThreadApi>,
    assistant_id: String,
    poll: PollPolicy,
}

impl ThreadedJob {
    pub fn new(api: Arc<dyn ThreadApi>, assistant_id: impl Into<String>, poll: PollPolicy) -> Self {
        Self {
            api,
            assistant_id: assistant_id.into(),
            poll,
        }
    }

    async fn latest_reply(&self, thread: &ThreadId) -> Result<String, ReplyError> {
        let page = self.api.list_messages(thread).await?;
        match page.latest(Role::Assistant) {
            Some(message) => Ok(message.content.trim().to_string()),
            None => {
                tracing::warn!(thread = %thread, "Completed job left no assistant message");
                Ok(JOB_FAILED_APOLOGY.to_string())
            }
        }
    }
}

#[async_trait]
impl ReplyProtocol for ThreadedJob {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::ThreadedJob
    }

    async fn open_thread(&self) -> Result<Option<ThreadId>, ReplyError> {
        Ok(Some(self.api.create_thread().await?))
    }

    async fn mirror(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), ReplyError> {
        self.api.post_message(thread, role, content).await?;
        Ok(())
    }

    async fn get_reply(&self, context: ReplyContext<'_>) -> Result<String, ReplyError> {
        let thread = context.thread.ok_or(ReplyError::MissingThread)?;

        let job = self.api.create_job(thread, &self.assistant_id).await?;
        tracing::debug!(thread = %thread, job = %job.id, "Started reply job");

        let status = wait_for_terminal(&self.poll, job.status, || {
            let job_id = job.id.clone();
            async move { self.api.get_job(thread, &job_id).await.map(|j| j.status) }
        })
        .await;

        match status {
            Ok(JobStatus::Completed) => self.latest_reply(thread).await,
            Ok(JobStatus::Failed) => {
                tracing::warn!(thread = %thread, job = %job.id, "Reply job failed");
                Ok(JOB_FAILED_APOLOGY.to_string())
            }
            // wait_for_terminal never yields a pending status
            Ok(JobStatus::Pending) => Ok(JOB_TIMEOUT_APOLOGY.to_string()),
            Err(PollError::TimedOut { attempts, elapsed }) => {
                tracing::warn!(
                    thread = %thread,
                    job = %job.id,
                    attempts,
                    elapsed_ms = %elapsed.as_millis(),
                    "Reply job did not finish in time"
                );
                Ok(JOB_TIMEOUT_APOLOGY.to_string())
            }
            Err(PollError::Transport(e)) => Err(e.into()),
        }
    }
}
