//! Convenience re-exports for common `steer-rs` types.
//!
//! ```ignore
//! use steer_rs::prelude::*;
//! ```
//!
//! Covers running turns end to end: the client and backend seam, config,
//! the pipeline and its events, classifiers, and the directive and
//! transcript types. Validator and template internals are left out; import
//! those from their modules directly.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatClient, ChatRequest, Message, json_schema_for};

// ── Backends ────────────────────────────────────────────────────────
pub use crate::api::{Backend, BackendError, BackendErrorKind, FnBackend};

// ── Configuration and prompts ───────────────────────────────────────
pub use crate::config::{RenderMode, RepairPolicy, StageConfig, SteerConfig};
pub use crate::prompt::{PromptOverrides, PromptRevision, PromptSet};

// ── Pipeline ────────────────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    PipelineEvent,
};
pub use crate::inference::{Classifier, LlmClassifier, RuleClassifier};
pub use crate::pipeline::{Pipeline, TurnOutcome};
pub use crate::render::{RenderedUtterance, UtteranceOrigin};
pub use crate::summary::IntentAssessment;

// ── Data ────────────────────────────────────────────────────────────
pub use crate::catalog::{Frame, State, StrategyName};
pub use crate::directive::StrategyDirective;
pub use crate::transcript::{ConversationMessage, Speaker, Transcript};
