//! The model backend seam.
//!
//! Every stage talks to a model through [`Backend`], a dyn-compatible trait
//! returning a boxed future. [`ChatClient`](crate::ChatClient) is the HTTP
//! implementation; [`FnBackend`] wraps a closure for tests, offline runs,
//! and embedding a different transport.

use super::error::BackendError;
use crate::{ChatClient, ChatRequest};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Boxed future returned by [`Backend::complete`].
pub type BackendFuture<'a> = BoxFuture<'a, Result<String, BackendError>>;

/// A text-completion backend.
///
/// Implementations return the completion text, or a classified error. An
/// empty completion must be reported as
/// [`BackendErrorKind::EmptyResponse`](super::BackendErrorKind::EmptyResponse).
pub trait Backend: Send + Sync {
    fn complete(&self, request: ChatRequest) -> BackendFuture<'_>;

    /// Human-readable label for logs.
    fn label(&self) -> &str {
        "backend"
    }
}

impl Backend for ChatClient {
    fn complete(&self, request: ChatRequest) -> BackendFuture<'_> {
        Box::pin(async move {
            let completion = self.chat(&request).await?;
            match completion.content {
                Some(text) if !text.trim().is_empty() => Ok(text),
                _ => Err(BackendError::empty(format!(
                    "model {} returned no text",
                    request.model
                ))),
            }
        })
    }

    fn label(&self) -> &str {
        &self.endpoint
    }
}

/// Run a backend call under a deadline. An elapsed deadline becomes a
/// [`BackendErrorKind::Timeout`](super::BackendErrorKind::Timeout) error and
/// the in-flight call is dropped.
pub async fn complete_within(
    backend: &dyn Backend,
    request: ChatRequest,
    deadline: Duration,
) -> Result<String, BackendError> {
    let model = request.model.clone();
    match tokio::time::timeout(deadline, backend.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::timeout(format!(
            "{model} did not answer within {:.1}s",
            deadline.as_secs_f64()
        ))),
    }
}

// ── FnBackend ─────────────────────────────────────────────────────

type ErasedBackendHandler = Box<dyn Fn(ChatRequest) -> BackendFuture<'static> + Send + Sync>;

/// A closure-based backend.
///
/// # Example
///
/// ```
/// use steer_rs::api::{Backend, FnBackend};
///
/// let backend = FnBackend::new(|req| async move {
///     Ok::<_, steer_rs::api::BackendError>(format!("echo: {}", req.user_text()))
/// });
/// assert_eq!(backend.label(), "fn");
/// ```
pub struct FnBackend {
    handler: ErasedBackendHandler,
    label: String,
}

impl FnBackend {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(ChatRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BackendError>> + Send + 'static,
    {
        let erased = move |req: ChatRequest| -> BackendFuture<'static> { Box::pin(handler(req)) };
        Self {
            handler: Box::new(erased),
            label: "fn".to_string(),
        }
    }

    /// A backend that always answers with `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| {
            let text = text.clone();
            async move { Ok(text) }
        })
    }

    /// A backend that always fails with `err`.
    pub fn failing(err: BackendError) -> Self {
        Self::new(move |_| {
            let err = err.clone();
            async move { Err(err) }
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Backend for FnBackend {
    fn complete(&self, request: ChatRequest) -> BackendFuture<'_> {
        (self.handler)(request)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for FnBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBackend")
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BackendErrorKind;
    use crate::Message;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("ping")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fn_backend_sees_request() {
        let backend = FnBackend::new(|req| async move {
            Ok::<_, BackendError>(req.user_text().to_uppercase())
        });
        assert_eq!(backend.complete(request()).await.unwrap(), "PING");
    }

    #[tokio::test]
    async fn failing_backend_returns_error() {
        let backend = FnBackend::failing(BackendError::new(BackendErrorKind::RateLimit, "slow"));
        let err = backend.complete(request()).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn deadline_produces_timeout_kind() {
        let backend = FnBackend::new(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BackendError>("late".to_string())
        });
        let err = complete_within(&backend, request(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
    }
}
