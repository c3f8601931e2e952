//! Bounded wait for an asynchronous reply job
//!
//! Polls with exponential backoff until the job leaves `Pending`, giving up
//! after `max_attempts` checks or once `deadline` has elapsed.

use crate::llm::{JobStatus, LlmError};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};

/// Backoff and deadline settings for job polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            max_attempts: 40,
            deadline: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Delay before the given (1-based) status check: 250ms, 500ms, 1s, ... capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("job still pending after {attempts} status checks ({elapsed:?})")]
    TimedOut { attempts: u32, elapsed: Duration },
    #[error("job status check failed: {0}")]
    Transport(#[from] LlmError),
}

/// Wait until `check` reports a terminal status.
///
/// `initial` is the status returned at submission; a job that is already
/// terminal is returned without polling.
pub async fn wait_for_terminal<F, Fut>(
    policy: &PollPolicy,
    initial: JobStatus,
    mut check: F,
) -> Result<JobStatus, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus, LlmError>>,
{
    if initial.is_terminal() {
        return Ok(initial);
    }

    let started = Instant::now();
    let mut attempts = 0u32;

    let poll = async {
        while attempts < policy.max_attempts {
            attempts += 1;
            sleep(policy.delay_for(attempts)).await;

            let status = check().await.map_err(Some)?;
            tracing::debug!(attempt = attempts, status = ?status, "Polled reply job");
            if status.is_terminal() {
                return Ok(status);
            }
        }
        Err(None)
    };

    let outcome = timeout(policy.deadline, poll).await;
    match outcome {
        Ok(Ok(status)) => Ok(status),
        Ok(Err(Some(e))) => Err(PollError::Transport(e)),
        Ok(Err(None)) | Err(_) => Err(PollError::TimedOut {
            attempts,
            elapsed: started.elapsed(),
        }),
    }
}
