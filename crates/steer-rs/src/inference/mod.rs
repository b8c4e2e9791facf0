//! The inference stage: turn context in, raw directive text out.
//!
//! Classification sits behind the [`Classifier`] trait. [`LlmClassifier`]
//! asks a chat model for the single-line JSON directive;
//! [`RuleClassifier`](rules::RuleClassifier) produces the same contract from
//! lexical cues with no network. Both return *raw text*: parsing, repair,
//! and invariant enforcement live in the [`validator`](crate::validator).

pub mod rules;

use crate::api::{Backend, BackendError, complete_within};
use crate::config::StageConfig;
use crate::transcript;
use crate::turn::ConversationTurnContext;
use crate::{ChatRequest, Message};
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::debug;

pub use rules::RuleClassifier;

/// Nucleus sampling used for directive generation.
pub const INFERENCE_TOP_P: f32 = 0.9;

/// Boxed future returned by [`Classifier::classify`].
pub type ClassifyFuture<'a> = BoxFuture<'a, Result<String, BackendError>>;

/// Maps a turn context to raw directive text.
///
/// Implementations return whatever they produced; a malformed answer is not
/// an error at this layer.
pub trait Classifier: Send + Sync {
    fn classify<'a>(&'a self, ctx: &'a ConversationTurnContext) -> ClassifyFuture<'a>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Build the inference user prompt for one turn.
pub fn user_prompt(ctx: &ConversationTurnContext) -> String {
    format!(
        "Based on the following conversation history, analyze the user's state and generate \
         the strategy JSON.\n\n\
         Internal Target (DO NOT REVEAL): {target}\n\
         Final Task Goal: {goal}\n\
         Turn number: {turn}\n\
         Consecutive target rejections: {rejects}\n\n\
         Recent Conversation:\n{conversation}\n\n\
         Guide the user toward the internal target while preserving their agency and helping \
         them reach the final task goal. Never mention the internal target directly.\n\n\
         Output single-line JSON:",
        target = ctx.hidden_target,
        goal = ctx.open_goal,
        turn = ctx.turn_index,
        rejects = ctx.consecutive_rejects,
        conversation = transcript::format_for_prompt(&ctx.transcript_window),
    )
}

/// A classifier that asks a chat model for the directive.
pub struct LlmClassifier<'a> {
    backend: &'a dyn Backend,
    stage: StageConfig,
    system_prompt: String,
    timeout: Duration,
}

impl<'a> LlmClassifier<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        stage: StageConfig,
        system_prompt: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            stage,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    /// The exact request sent for `ctx`.
    pub fn request(&self, ctx: &ConversationTurnContext) -> ChatRequest {
        ChatRequest {
            model: self.stage.model.clone(),
            messages: vec![
                Message::system(self.system_prompt.as_str()),
                Message::user(user_prompt(ctx)),
            ],
            max_tokens: self.stage.max_tokens,
            temperature: self.stage.temperature,
            top_p: Some(INFERENCE_TOP_P),
            stop: Some(vec!["\n".to_string()]),
        }
    }
}

impl Classifier for LlmClassifier<'_> {
    fn classify<'b>(&'b self, ctx: &'b ConversationTurnContext) -> ClassifyFuture<'b> {
        Box::pin(async move {
            let request = self.request(ctx);
            debug!(
                "Inference via {} (turn {}, {} messages)",
                self.backend.label(),
                ctx.turn_index,
                ctx.transcript_window.len()
            );
            let text = complete_within(self.backend, request, self.timeout).await?;
            Ok(text.trim().to_string())
        })
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FnBackend;
    use crate::transcript::ConversationMessage;

    fn ctx() -> ConversationTurnContext {
        let t = vec![
            ConversationMessage::assistant("Welcome!"),
            ConversationMessage::user("I like quiet places"),
        ];
        ConversationTurnContext::build(&t, "Medieval Castle", "Describe a scene", 1, 6).unwrap()
    }

    #[test]
    fn user_prompt_embeds_every_input() {
        let prompt = user_prompt(&ctx());
        assert!(prompt.contains("Internal Target (DO NOT REVEAL): Medieval Castle"));
        assert!(prompt.contains("Final Task Goal: Describe a scene"));
        assert!(prompt.contains("Turn number: 1"));
        assert!(prompt.contains("AI: Welcome!\nUser: I like quiet places"));
    }

    #[test]
    fn request_uses_stage_settings_and_single_line_stop() {
        let backend = FnBackend::fixed("{}");
        let classifier = LlmClassifier::new(
            &backend,
            StageConfig::inference(),
            "system",
            Duration::from_secs(1),
        );
        let req = classifier.request(&ctx());
        assert_eq!(req.model, "gpt-4.1");
        assert_eq!(req.max_tokens, 500);
        assert_eq!(req.top_p, Some(INFERENCE_TOP_P));
        assert_eq!(req.stop, Some(vec!["\n".to_string()]));
        assert_eq!(req.system_text(), "system");
    }

    #[tokio::test]
    async fn classify_returns_trimmed_backend_text() {
        let backend = FnBackend::fixed("  {\"state\":\"S1\"}  ");
        let classifier =
            LlmClassifier::new(&backend, StageConfig::inference(), "s", Duration::from_secs(1));
        assert_eq!(classifier.classify(&ctx()).await.unwrap(), "{\"state\":\"S1\"}");
    }
}
