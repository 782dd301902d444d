//! # Language Model Module
//!
//! The seam between the reconciliation pipeline and the inference endpoint.
//!
//! The pipeline makes three kinds of inference calls (dish classification,
//! name resolution, unit estimation). All of them go through the
//! [`LanguageModel`] trait as a prompt in, raw text out exchange. Replies are
//! untrusted: validating them is the job of the caller, never of the model.
//!
//! ## Implementations
//!
//! - [`OpenAiChatClient`]: OpenAI-compatible `chat/completions` over reqwest
//! - [`GuardedModel`]: wraps any model with timeout, bounded retry and a
//!   circuit breaker
//! - [`ScriptedModel`]: canned replies keyed by task and prompt content, for
//!   offline runs and tests

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, instrument, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{LlmConfig, RecoveryConfig};
use crate::errors::InferenceError;
use crate::retry::retry_with_backoff;

/// Which pipeline step a prompt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceTask {
    /// Ingredient vs prepared dish
    ClassifyFood,
    /// Noisy name to catalog name
    ResolveName,
    /// Unit conversion estimate
    EstimateConversion,
}

impl InferenceTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceTask::ClassifyFood => "classify_food",
            InferenceTask::ResolveName => "resolve_name",
            InferenceTask::EstimateConversion => "estimate_conversion",
        }
    }
}

impl fmt::Display for InferenceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub task: InferenceTask,
    pub prompt: String,
}

impl InferenceRequest {
    pub fn new(task: InferenceTask, prompt: String) -> Self {
        Self { task, prompt }
    }
}

/// A text-completion backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the prompt and return the raw reply text
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.as_ref().complete(request).await
    }
}

// ============================================================================
// OpenAI-compatible HTTP client
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    #[instrument(skip(self, request), fields(task = %request.task, model = %self.config.model))]
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: self.config.temperature,
        };

        let mut http_request = self.client.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request.send().await.map_err(|e| {
            error!(error = %e, "Failed to reach inference endpoint");
            InferenceError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| InferenceError::Decode(format!("Failed to parse completion: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| InferenceError::Decode("Completion had no content".to_string()))?;

        debug!(chars = content.len(), "Received completion");
        Ok(content)
    }
}

// ============================================================================
// Guarded wrapper
// ============================================================================

/// Adds timeout, bounded retry and a circuit breaker to another model
#[derive(Debug)]
pub struct GuardedModel<M> {
    inner: M,
    recovery: RecoveryConfig,
    circuit_breaker: CircuitBreaker,
}

impl<M: LanguageModel> GuardedModel<M> {
    pub fn new(inner: M, recovery: RecoveryConfig) -> Self {
        Self {
            inner,
            circuit_breaker: CircuitBreaker::new(recovery.clone()),
            recovery,
        }
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for GuardedModel<M> {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        if self.circuit_breaker.is_open() {
            warn!(task = %request.task, "Circuit breaker open, skipping inference call");
            return Err(InferenceError::CircuitOpen);
        }

        let result = retry_with_backoff(&self.recovery, request.task.as_str(), move || {
            self.inner.complete(request)
        })
        .await;

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(_) => self.circuit_breaker.record_failure(),
        }
        result
    }
}

// ============================================================================
// Scripted model
// ============================================================================

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Fail(InferenceError),
}

#[derive(Debug, Clone)]
struct ScriptRule {
    task: InferenceTask,
    needle: String,
    reply: ScriptedReply,
}

/// Model answering from a fixed script
///
/// Rules are checked in insertion order; the first rule whose task matches
/// and whose needle occurs in the prompt answers. Without a match the model
/// fails with a transport error. Every request is recorded.
///
/// # Examples
///
/// ```rust
/// use pantry::llm::{InferenceTask, ScriptedModel};
///
/// let model = ScriptedModel::new()
///     .on(InferenceTask::ClassifyFood, "lasagna", "DISH")
///     .on(InferenceTask::ClassifyFood, "", "INGREDIENT");
/// assert_eq!(model.request_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Vec<ScriptRule>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` to `task` prompts containing `needle`
    pub fn on(mut self, task: InferenceTask, needle: &str, reply: &str) -> Self {
        self.rules.push(ScriptRule {
            task,
            needle: needle.to_string(),
            reply: ScriptedReply::Text(reply.to_string()),
        });
        self
    }

    /// Fail `task` prompts containing `needle` with `error`
    pub fn fail_on(mut self, task: InferenceTask, needle: &str, error: InferenceError) -> Self {
        self.rules.push(ScriptRule {
            task,
            needle: needle.to_string(),
            reply: ScriptedReply::Fail(error),
        });
        self
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of requests received for one task
    pub fn count_for(&self, task: InferenceTask) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.task == task)
            .count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let rule = self
            .rules
            .iter()
            .find(|rule| rule.task == request.task && request.prompt.contains(&rule.needle));

        match rule.map(|r| &r.reply) {
            Some(ScriptedReply::Text(text)) => Ok(text.clone()),
            Some(ScriptedReply::Fail(err)) => Err(err.clone()),
            None => Err(InferenceError::Transport(format!(
                "no scripted reply for {} prompt",
                request.task
            ))),
        }
    }
}
