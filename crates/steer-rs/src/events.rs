//! Events and handlers for the [`Pipeline`](crate::pipeline::Pipeline).
//!
//! The pipeline reports what happens during a turn through
//! [`PipelineEvent`] variants. Callers implement [`EventHandler`] to observe
//! them for logging, diagnostic panels, or metrics. Handlers are purely
//! observational: nothing they do changes the turn's outcome.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::api::BackendError;
use crate::directive::StrategyDirective;
use crate::render::RenderedUtterance;
use crate::render::guard::Violation;
use crate::validator::FallbackReason;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the pipeline during a turn or a summary.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// A turn is starting.
    TurnStarted {
        turn_index: u32,
        window_len: usize,
        consecutive_rejects: u32,
    },
    /// The inference output was truncated and closing tokens were appended.
    DirectiveRepaired,
    /// Inference failed and the fallback directive is in use.
    FallbackDirective { reason: &'a FallbackReason },
    /// Inference produced a directive that passed validation.
    DirectiveAccepted { directive: &'a StrategyDirective },
    /// The render backend failed; the frames-only question was used.
    RenderFailed { error: &'a BackendError },
    /// Rendered text broke an output rule and was replaced.
    RenderViolation { violation: &'a Violation },
    /// The turn finished.
    TurnFinished {
        directive: &'a StrategyDirective,
        utterance: &'a RenderedUtterance,
    },
    /// The summary call failed. The error is also returned to the caller.
    SummaryFailed { error: &'a BackendError },
}

/// Handler for pipeline events. The default implementation ignores them.
///
/// # Example
///
/// ```
/// use steer_rs::events::{EventHandler, PipelineEvent};
///
/// struct Badge;
///
/// impl EventHandler for Badge {
///     fn on_event(&self, event: &PipelineEvent<'_>) {
///         if let PipelineEvent::TurnFinished { directive, .. } = event {
///             println!("[{}]", directive.state);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// A handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event)
    }
}

/// A handler that forwards each event to several inner handlers, in
/// registration order.
///
/// ```
/// use steer_rs::events::{CompositeEventHandler, LoggingHandler, NoopHandler};
///
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(false, NoopHandler);
/// assert_eq!(handler.len(), 1);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add `handler` only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// A handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::TurnStarted {
                turn_index,
                window_len,
                consecutive_rejects,
            } => {
                debug!(
                    "Turn {turn_index}: {window_len} messages in window, {consecutive_rejects} consecutive rejects"
                );
            }
            PipelineEvent::DirectiveRepaired => {
                debug!("Directive was truncated and repaired");
            }
            PipelineEvent::FallbackDirective { reason } => {
                warn!("Fallback directive: {reason}");
            }
            PipelineEvent::DirectiveAccepted { directive } => {
                let names: Vec<&str> = directive.ranked().iter().map(|s| s.name.as_str()).collect();
                debug!(
                    "Directive: state={}, frames={}, strategies=[{}]",
                    directive.state,
                    directive.frames.len(),
                    names.join(", ")
                );
            }
            PipelineEvent::RenderFailed { error } => {
                warn!("Render failed: {error}");
            }
            PipelineEvent::RenderViolation { violation } => {
                warn!("Render output discarded: {violation}");
            }
            PipelineEvent::TurnFinished {
                directive,
                utterance,
            } => {
                info!(
                    "Turn done: state={} ({} chars, {:?})",
                    directive.state,
                    utterance.text.len(),
                    utterance.origin
                );
            }
            PipelineEvent::SummaryFailed { error } => {
                warn!("Summary failed: {error}");
            }
        }
    }
}
