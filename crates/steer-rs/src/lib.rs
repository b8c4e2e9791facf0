//! Two-stage conversational steering pipeline for design dialogues.
//!
//! `steer-rs` sits between a user and a chat model. Each turn it reads the
//! recent conversation, infers the user's conversational state and a ranked
//! set of steering strategies as a structured
//! [`StrategyDirective`](directive::StrategyDirective), then renders that
//! directive into a short, natural assistant utterance that nudges the user
//! toward a hidden target without ever naming it.
//!
//! Any model failure degrades to a safe default: a fixed exploration
//! directive on the inference side, a frames-only question on the render
//! side. A turn always yields an utterance.
//!
//! # Getting started
//!
//! ```ignore
//! use steer_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BackendError> {
//!     let config = SteerConfig::default();
//!     let client = ChatClient::from_config(&config)?;
//!
//!     let mut transcript = Transcript::new();
//!     transcript.push_user("I like quiet places");
//!
//!     let outcome = Pipeline::new(&client, config.clone())
//!         .with_event_handler(&LoggingHandler)
//!         .run_turn(transcript.messages(), &config.hidden_target, &config.open_goal, 0)
//!         .await;
//!
//!     println!("{}", outcome.utterance.text);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Vocabulary:** [`catalog`] holds the state, strategy, and frame tables.
//! - **Inference:** [`inference`] has the [`Classifier`](inference::Classifier)
//!   trait with a model-backed and a deterministic rule-based implementation;
//!   [`validator`] parses, checks, repairs, and enforces directives.
//! - **Rendering:** [`render`] maps the lead strategy to a template, optionally
//!   polishes it with a model, and guards the result.
//! - **Orchestration:** [`pipeline::Pipeline`] runs a full turn, a summary,
//!   or an intent assessment. Observe it with an
//!   [`EventHandler`](events::EventHandler).
//! - **Backends:** [`api::Backend`] is the seam for model calls;
//!   [`ChatClient`] speaks the OpenAI-compatible chat completions protocol
//!   and [`api::FnBackend`] wraps a closure for tests and offline use.

pub mod api;
pub mod catalog;
pub mod config;
pub mod cues;
pub mod directive;
pub mod events;
pub mod inference;
pub mod pipeline;
pub mod prelude;
pub mod prompt;
pub mod render;
pub mod summary;
pub mod transcript;
pub mod turn;
pub mod validator;

use api::{BackendError, BackendErrorKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use steer_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Verdict {
///     keep: bool,
///     #[serde(default)]
///     note: Option<String>,
/// }
///
/// let schema = json_schema_for::<Verdict>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"keep".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

impl ChatRequest {
    /// The system message content, if any.
    pub fn system_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map_or("", |m| m.content.as_str())
    }

    /// The last user message content, if any.
    pub fn user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map_or("", |m| m.content.as_str())
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message sent to the backend.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A backend chat message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct ChatClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
}

impl ChatClient {
    /// Create a client for the default endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_endpoint(
            api_key,
            OPENAI_CHAT_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a client for a custom endpoint and request timeout.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(BackendError::missing_credential());
        }
        let client = reqwest::Client::builder()
            .user_agent("steer-rs/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    /// Create a client from the endpoint, timeout and credential in `config`.
    pub fn from_config(config: &config::SteerConfig) -> Result<Self, BackendError> {
        let key = config
            .resolve_api_key()
            .ok_or_else(BackendError::missing_credential)?;
        Self::with_endpoint(key, &config.endpoint, config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, BackendError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::network(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(BackendError::from_http(status, &text));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text).map_err(|e| {
            BackendError::new(
                BackendErrorKind::MalformedResponse,
                format!("failed to parse response: {e}"),
            )
        })?;

        if let Some(err) = parsed.error {
            let code = err.code.unwrap_or_default();
            let kind = if code == "insufficient_quota" {
                BackendErrorKind::Quota
            } else if code == "model_not_found" {
                BackendErrorKind::ModelNotFound
            } else {
                BackendErrorKind::InvalidRequest
            };
            return Err(BackendError::new(kind, err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        match choice {
            Some(c) => {
                debug!(
                    "LLM output: {} chars",
                    c.message.content.as_ref().map_or(0, |s| s.len())
                );
                Ok(ChatCompletion {
                    content: c.message.content,
                    usage: parsed.usage,
                    finish_reason: c.finish_reason,
                })
            }
            None => {
                debug!("LLM output: empty (no choices)");
                Ok(ChatCompletion {
                    content: None,
                    usage: parsed.usage,
                    finish_reason: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");
        assert_eq!(Message::user("world").role, MessageRole::User);
        assert_eq!(Message::assistant("ok").role, MessageRole::Assistant);
    }

    #[test]
    fn chat_request_skips_unset_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn request_accessors_find_system_and_last_user() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![
                Message::system("rules"),
                Message::user("first"),
                Message::user("second"),
            ],
            ..Default::default()
        };
        assert_eq!(req.system_text(), "rules");
        assert_eq!(req.user_text(), "second");
    }

    #[test]
    fn client_requires_credential() {
        let err = ChatClient::new("  ").err().map(|e| e.kind);
        assert_eq!(err, Some(BackendErrorKind::MissingCredential));
    }
}
