//! Backend error classification.
//!
//! Every backend call resolves to text or a [`BackendError`]. The inference
//! and render stages absorb these errors into their fallbacks; only the
//! summary call hands them to the caller, so the kinds are fine-grained
//! enough for a UI to pick a message (bad credential vs. rate limit vs.
//! quota).

use reqwest::StatusCode;
use thiserror::Error;

/// Backend error with classification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

/// Error classification.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection failure or unreadable response body.
    #[error("network error")]
    Network,
    /// The call did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// No API key configured.
    #[error("missing API credential")]
    MissingCredential,
    /// HTTP 401/403.
    #[error("invalid API credential")]
    Auth,
    /// HTTP 429 without a quota marker.
    #[error("rate limited")]
    RateLimit,
    /// Billing quota exhausted (`insufficient_quota`).
    #[error("insufficient quota")]
    Quota,
    /// The configured model does not exist or is not available.
    #[error("model not found")]
    ModelNotFound,
    /// HTTP 5xx.
    #[error("server error")]
    ServerError,
    /// HTTP 400/422 and other rejected requests.
    #[error("invalid request")]
    InvalidRequest,
    /// Success status but no usable text.
    #[error("empty response")]
    EmptyResponse,
    /// Success status but a body that is not a chat completion.
    #[error("malformed response")]
    MalformedResponse,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Timeout, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::EmptyResponse, message)
    }

    pub fn missing_credential() -> Self {
        Self::new(
            BackendErrorKind::MissingCredential,
            "set STEER_API_KEY or OPENAI_API_KEY, or api_key in the config file",
        )
    }

    /// Classify a non-success HTTP response from its status and body.
    pub fn from_http(status: StatusCode, body: &str) -> Self {
        let kind = classify_http(status, body);
        let snippet: String = body.chars().take(300).collect();
        Self::new(kind, format!("HTTP {}: {snippet}", status.as_u16()))
    }

    /// Classify a transport-level reqwest failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("request timed out: {err}"))
        } else {
            Self::network(format!("request failed: {err}"))
        }
    }

    /// Short user-facing message for display when this error is surfaced.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            BackendErrorKind::Auth | BackendErrorKind::MissingCredential => {
                "Invalid API key, please check that your API key is correct."
            }
            BackendErrorKind::RateLimit => "API rate limit exceeded, please try again later.",
            BackendErrorKind::Quota => {
                "Insufficient API quota, please check your account balance."
            }
            BackendErrorKind::ModelNotFound => {
                "The selected model is not available, please try another model."
            }
            BackendErrorKind::Timeout => "The request timed out, please try again.",
            _ => "An error occurred while contacting the model, please try again.",
        }
    }
}

/// Map an HTTP failure to an error kind. Body markers take precedence over
/// the bare status because providers report quota exhaustion as 429.
pub fn classify_http(status: StatusCode, body: &str) -> BackendErrorKind {
    if body.contains("insufficient_quota") {
        return BackendErrorKind::Quota;
    }
    if body.contains("model_not_found") {
        return BackendErrorKind::ModelNotFound;
    }
    match status.as_u16() {
        401 | 403 => BackendErrorKind::Auth,
        429 => BackendErrorKind::RateLimit,
        404 => BackendErrorKind::ModelNotFound,
        400 | 422 => BackendErrorKind::InvalidRequest,
        500..=599 => BackendErrorKind::ServerError,
        _ => BackendErrorKind::InvalidRequest,
    }
}
