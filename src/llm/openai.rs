//! `OpenAI`-compatible client: chat completions, assistants threads and moderation

use super::types::{
    ChatMessage, Completion, CompletionRequest, JobId, JobStatus, MessageOrder, MessagePage,
    ModerationResponse, ReplyJob, Role, ThreadId, ThreadMessage, Usage,
};
use super::{CompletionApi, LlmError, ModerationApi, ThreadApi};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Header selecting the v2 assistants (threads/runs) API
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Page size when reading a thread back; only the newest reply is used
const MESSAGE_PAGE_LIMIT: u32 = 20;

/// HTTP client for an `OpenAI`-compatible API root
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.api_key)
    }

    /// Send a request and decode a successful JSON body, classifying failures
    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, LlmError> {
        let response = request
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            let error = LlmError::from_status(status, &message);
            return Err(match retry_after {
                Some(delay) => error.with_retry_after(delay),
                None => error,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            LlmError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })
    }

    fn normalize_completion(resp: ChatCompletionResponse) -> Result<Completion, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::malformed("No choices in response"))?;

        let content = choice
            .message
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::malformed("Empty completion content"))?;

        Ok(Completion {
            content,
            usage: resp
                .usage
                .map(|u| Usage {
                    input_tokens: u64::from(u.prompt_tokens),
                    output_tokens: u64::from(u.completion_tokens),
                })
                .unwrap_or_default(),
        })
    }

    fn normalize_thread_message(msg: ThreadMessageObject) -> ThreadMessage {
        let content = msg
            .content
            .into_iter()
            .filter_map(|part| part.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");
        ThreadMessage {
            role: msg.role,
            content,
        }
    }
}

/// Map a remote run status onto the local job lifecycle.
///
/// Every status the API documents as final counts as terminal so that a
/// cancelled or expired run ends the wait instead of looking pending forever.
pub fn map_run_status(status: &str) -> JobStatus {
    match status {
        "completed" => JobStatus::Completed,
        "failed" | "cancelled" | "expired" | "incomplete" | "requires_action" => {
            JobStatus::Failed
        }
        _ => JobStatus::Pending,
    }
}

#[async_trait]
impl CompletionApi for OpenAIClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let resp: ChatCompletionResponse = Self::send(
            self.post("chat/completions")
                .timeout(request.timeout)
                .json(&body),
        )
        .await?;

        Self::normalize_completion(resp)
    }
}

#[async_trait]
impl ThreadApi for OpenAIClient {
    async fn create_thread(&self) -> Result<ThreadId, LlmError> {
        let thread: IdObject = Self::send(
            self.post("threads")
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&serde_json::json!({})),
        )
        .await?;
        Ok(ThreadId(thread.id))
    }

    async fn post_message(
        &self,
        thread: &ThreadId,
        role: Role,
        content: &str,
    ) -> Result<(), LlmError> {
        if role == Role::System {
            return Err(LlmError::invalid_request(
                "Threads only accept user and assistant messages",
            ));
        }

        let _: IdObject = Self::send(
            self.post(&format!("threads/{thread}/messages"))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&ThreadMessageRequest { role, content }),
        )
        .await?;
        Ok(())
    }

    async fn create_job(
        &self,
        thread: &ThreadId,
        assistant_id: &str,
    ) -> Result<ReplyJob, LlmError> {
        let run: RunObject = Self::send(
            self.post(&format!("threads/{thread}/runs"))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .json(&RunRequest { assistant_id }),
        )
        .await?;
        Ok(run.into())
    }

    async fn get_job(&self, thread: &ThreadId, job: &JobId) -> Result<ReplyJob, LlmError> {
        let run: RunObject = Self::send(
            self.get(&format!("threads/{thread}/runs/{job}"))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1),
        )
        .await?;
        Ok(run.into())
    }

    async fn list_messages(&self, thread: &ThreadId) -> Result<MessagePage, LlmError> {
        let list: MessageListResponse = Self::send(
            self.get(&format!("threads/{thread}/messages"))
                .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
                .query(&[
                    ("order", "desc".to_string()),
                    ("limit", MESSAGE_PAGE_LIMIT.to_string()),
                ]),
        )
        .await?;

        Ok(MessagePage {
            order: MessageOrder::NewestFirst,
            messages: list
                .data
                .into_iter()
                .map(Self::normalize_thread_message)
                .collect(),
        })
    }
}

#[async_trait]
impl ModerationApi for OpenAIClient {
    async fn classify(&self, text: &str, model: &str) -> Result<ModerationResponse, LlmError> {
        Self::send(
            self.post("moderations")
                .json(&ModerationRequest { model, input: text }),
        )
        .await
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct ThreadMessageRequest<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
}

impl From<RunObject> for ReplyJob {
    fn from(run: RunObject) -> Self {
        ReplyJob {
            status: map_run_status(&run.status),
            id: JobId(run.id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    data: Vec<ThreadMessageObject>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessageObject {
    role: Role,
    #[serde(default)]
    content: Vec<ThreadContentPart>,
}

#[derive(Debug, Deserialize)]
struct ThreadContentPart {
    #[serde(default)]
    text: Option<ThreadText>,
}

#[derive(Debug, Deserialize)]
struct ThreadText {
    value: String,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
