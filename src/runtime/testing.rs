//! Mock implementations for testing
//!
//! In-memory stand-ins for the remote API traits so sessions can be driven
//! end to end without network I/O.

use crate::llm::{
    Completion, CompletionApi, CompletionRequest, JobId, JobStatus, LlmError, MessageOrder,
    MessagePage, ModerationApi, ModerationResponse, ModerationResult, ReplyJob, Role, ThreadApi,
    ThreadId, ThreadMessage, Usage,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Moderation
// ============================================================================

/// What the fake classifier answers
#[derive(Debug, Clone)]
pub enum ModerationScript {
    Flag,
    Clear,
    Error(LlmError),
    /// Success with an empty `results` list
    Empty,
    /// Never answers
    Hang,
}

pub struct FakeModeration {
    script: Mutex<ModerationScript>,
    classified: Mutex<Vec<String>>,
}

impl FakeModeration {
    pub fn new(script: ModerationScript) -> Self {
        Self {
            script: Mutex::new(script),
            classified: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: ModerationScript) {
        *self.script.lock().unwrap() = script;
    }

    /// Texts sent for classification, in order
    pub fn classified(&self) -> Vec<String> {
        self.classified.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModerationApi for FakeModeration {
    async fn classify(&self, text: &str, _model: &str) -> Result<ModerationResponse, LlmError> {
        self.classified.lock().unwrap().push(text.to_string());
        let script = self.script.lock().unwrap().clone();
        match script {
            ModerationScript::Flag => Ok(ModerationResponse {
                results: vec![ModerationResult { flagged: true }],
            }),
            ModerationScript::Clear => Ok(ModerationResponse {
                results: vec![ModerationResult { flagged: false }],
            }),
            ModerationScript::Error(e) => Err(e),
            ModerationScript::Empty => Ok(ModerationResponse::default()),
            ModerationScript::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Direct chat
// ============================================================================

/// Completion API returning queued responses
pub struct FakeCompletions {
    responses: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletions {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, content: &str) {
        self.responses.lock().unwrap().push_back(Ok(Completion {
            content: content.to_string(),
            usage: Usage::default(),
        }));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for FakeCompletions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionApi for FakeCompletions {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

// ============================================================================
// Threaded jobs
// ============================================================================

/// Scripted lifecycle of one job
#[derive(Debug, Clone, Default)]
struct JobScript {
    /// Statuses returned by successive `get_job` calls; `Pending` once exhausted
    statuses: VecDeque<JobStatus>,
    /// Assistant message written to the thread when the job completes
    reply: Option<String>,
}

/// Threaded job API backed by one in-memory message list
pub struct FakeThreadApi {
    order: MessageOrder,
    threads: Mutex<Vec<ThreadId>>,
    /// Thread contents, oldest first
    messages: Mutex<Vec<ThreadMessage>>,
    posted: Mutex<Vec<(ThreadId, Role, String)>>,
    scripts: Mutex<VecDeque<JobScript>>,
    running: Mutex<HashMap<JobId, JobScript>>,
    job_errors: Mutex<VecDeque<LlmError>>,
    jobs_created: Mutex<Vec<String>>,
}

impl FakeThreadApi {
    pub fn new() -> Self {
        Self::with_order(MessageOrder::NewestFirst)
    }

    pub fn with_order(order: MessageOrder) -> Self {
        Self {
            order,
            threads: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
            running: Mutex::new(HashMap::new()),
            job_errors: Mutex::new(VecDeque::new()),
            jobs_created: Mutex::new(Vec::new()),
        }
    }

    /// Next job walks through `statuses` and posts `reply` on completion
    pub fn script_job(&self, statuses: &[JobStatus], reply: &str) {
        self.scripts.lock().unwrap().push_back(JobScript {
            statuses: statuses.iter().copied().collect(),
            reply: Some(reply.to_string()),
        });
    }

    /// Next job completes without writing an assistant message
    pub fn script_silent_job(&self, statuses: &[JobStatus]) {
        self.scripts.lock().unwrap().push_back(JobScript {
            statuses: statuses.iter().copied().collect(),
            reply: None,
        });
    }

    /// Next job never leaves `Pending`
    pub fn script_stuck_job(&self) {
        self.scripts.lock().unwrap().push_back(JobScript::default());
    }

    pub fn fail_next_job(&self, error: LlmError) {
        self.job_errors.lock().unwrap().push_back(error);
    }

    pub fn seed_assistant_message(&self, content: &str) {
        self.messages.lock().unwrap().push(ThreadMessage {
            role: Role::Assistant,
            content: content.to_string(),
        });
    }

    pub fn threads_created(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    /// Assistant ids of every job started
    pub fn jobs_created(&self) -> Vec<String> {
        self.jobs_created.lock().unwrap().clone()
    }

    /// Messages posted by the client, in order
    pub fn posted(&self) -> Vec<(ThreadId, Role, String)> {
        self.posted.lock().unwrap().clone()
    }
}

impl Default for FakeThreadApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadApi for FakeThreadApi {
    async fn create_thread(&self) -> Result<ThreadId, LlmError> {
        let mut threads = self.threads.lock().unwrap();
        let id = ThreadId(format!("thread_{}", threads.len() + 1));
        threads.push(id.clone());
        Ok(id)
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), LlmError> {
        if role == Role::System {
            return Err(LlmError::invalid_request("system messages cannot be posted"));
        }
        self.posted
            .lock()
            .unwrap()
            .push((thread.clone(), role, content.to_string()));
        self.messages.lock().unwrap().push(ThreadMessage {
            role,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_job(
        &self,
        _thread: &ThreadId,
        assistant_id: &str,
    ) -> Result<ReplyJob, LlmError> {
        if let Some(e) = self.job_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::network("No job scripted"))?;

        let mut created = self.jobs_created.lock().unwrap();
        created.push(assistant_id.to_string());
        let id = JobId(format!("run_{}", created.len()));
        self.running.lock().unwrap().insert(id.clone(), script);

        Ok(ReplyJob {
            id,
            status: JobStatus::Pending,
        })
    }

    async fn get_job(&self, _thread: &ThreadId, job: &JobId) -> Result<ReplyJob, LlmError> {
        let mut running = self.running.lock().unwrap();
        let script = running
            .get_mut(job)
            .ok_or_else(|| LlmError::invalid_request(format!("unknown job {job}")))?;

        let status = script.statuses.pop_front().unwrap_or(JobStatus::Pending);
        if status == JobStatus::Completed {
            if let Some(reply) = script.reply.take() {
                self.messages.lock().unwrap().push(ThreadMessage {
                    role: Role::Assistant,
                    content: reply,
                });
            }
        }

        Ok(ReplyJob {
            id: job.clone(),
            status,
        })
    }

    async fn list_messages(&self, _thread: &ThreadId) -> Result<MessagePage, LlmError> {
        let mut messages = self.messages.lock().unwrap().clone();
        if self.order == MessageOrder::NewestFirst {
            messages.reverse();
        }
        Ok(MessagePage {
            order: self.order,
            messages,
        })
    }
}
