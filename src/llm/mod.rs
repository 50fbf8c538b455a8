//! Hosted chat-completion client used to answer questions.
//!
//! The Groq endpoint speaks the OpenAI chat-completions protocol, so the client works against any
//! compatible base URL. Each prompt is sent as a single user message and the first choice's
//! content is returned verbatim.

use crate::config::Config;
use crate::retry::{AttemptError, RetryPolicy, is_transient_status, is_transient_transport};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Request never produced a response (connection failure, timeout).
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with a non-success status (auth failure, rate limit, server error).
    #[error("LLM request failed: {0}")]
    Upstream(String),
    /// Provider response could not be parsed or carried no answer.
    #[error("Malformed LLM response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `prompt` as a single user message and return the model's reply.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Chat-completion client for Groq (or any OpenAI-compatible API).
pub struct GroqChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqChatClient {
    /// Build a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let http = Client::builder()
            .user_agent("pdf-rag/answer")
            .timeout(config.upstream_timeout())
            .build()
            .map_err(|error| LlmError::Unavailable(format!("failed to build HTTP client: {error}")))?;
        Ok(Self::new(
            http,
            &config.llm_base_url,
            config.groq_api_key.clone(),
            config.llm_model.clone(),
            config.llm_temperature,
            RetryPolicy::from_config(config),
        ))
    }

    /// Build a client against `base_url` (e.g. `https://api.groq.com/openai/v1`).
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: String,
        model: String,
        temperature: f32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
            temperature,
            retry,
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<String, AttemptError<LlmError>> {
        let request = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                let wrapped = LlmError::Unavailable(format!(
                    "failed to reach {}: {error}",
                    self.endpoint
                ));
                if is_transient_transport(&error) {
                    AttemptError::Transient(wrapped)
                } else {
                    AttemptError::Permanent(wrapped)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = LlmError::Upstream(format!("provider returned {status}: {body}"));
            return Err(if is_transient_status(status) {
                AttemptError::Transient(error)
            } else {
                AttemptError::Permanent(error)
            });
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            AttemptError::Permanent(LlmError::InvalidResponse(format!(
                "failed to decode completion: {error}"
            )))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AttemptError::Permanent(LlmError::InvalidResponse(
                    "completion contained no message content".into(),
                ))
            })
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(
            model = %self.model,
            temperature = self.temperature,
            prompt_chars = prompt.chars().count(),
            "Requesting completion"
        );
        let started = std::time::Instant::now();
        let answer = self
            .retry
            .run("chat_completion", || self.attempt(prompt))
            .await?;
        tracing::info!(
            model = %self.model,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            answer_chars = answer.chars().count(),
            "Completion received"
        );
        Ok(answer)
    }
}
