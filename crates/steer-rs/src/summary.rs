//! Module finalization: the summary request and the intent check.
//!
//! Both are one-shot calls built as a `(system, user)` pair. Unlike the
//! turn pipeline, summary errors are returned to the caller; the intent
//! check degrades to [`IntentAssessment::neutral`].

use crate::config::StageConfig;
use crate::prompt::PromptSet;
use crate::transcript::{self, ConversationMessage};
use crate::{ChatRequest, Message};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Temperature for the intent check.
pub const INTENT_TEMPERATURE: f32 = 0.1;

const INTENT_SYSTEM_PROMPT: &str = "\
You judge whether a user wants to adopt the content discussed in a conversation. Reply with one \
JSON object and nothing else: {\"should_use\": boolean, \"summary\": string, \"confidence\": \
number}. The summary is at most 50 words. Confidence is between 0 and 1 and reflects how \
explicitly the user expressed it.

Signs the user wants to adopt the content:
- They explicitly say they want to use an idea or concept.
- They express satisfaction with or approval of a description.
- They confirm with words like \"let's use this\", \"okay\", or \"sounds good\".";

/// Build the `(system, user)` pair for a module summary.
pub fn summary_messages(
    prompts: &PromptSet,
    messages: &[ConversationMessage],
    label: &str,
    goal: &str,
) -> (String, String) {
    let mut user = String::from("Conversation content:\n");
    user.push_str(&transcript::format_for_prompt(messages));
    user.push_str("\n\nFinal task goal: ");
    user.push_str(goal.trim());
    (prompts.summary_instruction(label), user)
}

/// The summary request for a finalized module.
pub fn summary_request(
    prompts: &PromptSet,
    stage: &StageConfig,
    messages: &[ConversationMessage],
    label: &str,
    goal: &str,
) -> ChatRequest {
    let (system, user) = summary_messages(prompts, messages, label, goal);
    debug!(
        "Summary request for {label}: {} messages, {} chars",
        messages.len(),
        user.len()
    );
    ChatRequest {
        model: stage.model.clone(),
        messages: vec![Message::system(system), Message::user(user)],
        max_tokens: stage.max_tokens,
        temperature: stage.temperature,
        ..Default::default()
    }
}

// ── Intent ─────────────────────────────────────────────────────────

/// Whether the user wants to adopt the discussed content.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IntentAssessment {
    #[serde(default)]
    pub should_use: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub confidence: f32,
}

impl IntentAssessment {
    /// The assessment used when the check cannot be made.
    pub fn neutral() -> Self {
        Self {
            should_use: false,
            summary: String::new(),
            confidence: 0.0,
        }
    }

    /// Parse a model reply, tolerating a fenced code block or text around
    /// the object. Anything unreadable yields `None`.
    pub fn from_reply(reply: &str) -> Option<Self> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        let body = reply.get(start..=end)?;
        let mut parsed: Self = serde_json::from_str(body).ok()?;
        parsed.confidence = if parsed.confidence.is_finite() {
            parsed.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(parsed)
    }
}

impl Default for IntentAssessment {
    fn default() -> Self {
        Self::neutral()
    }
}

/// The intent-check request for a module.
pub fn intent_request(
    stage: &StageConfig,
    messages: &[ConversationMessage],
    label: &str,
) -> ChatRequest {
    let user = format!(
        "Content type: {label}\n\nConversation:\n{}",
        transcript::format_for_prompt(messages)
    );
    ChatRequest {
        model: stage.model.clone(),
        messages: vec![Message::system(INTENT_SYSTEM_PROMPT), Message::user(user)],
        max_tokens: stage.max_tokens,
        temperature: INTENT_TEMPERATURE,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::user("A foggy hillside at dawn"),
            ConversationMessage::assistant("Lovely. Stone or timber?"),
            ConversationMessage::user("Stone, let's use this"),
        ]
    }

    #[test]
    fn summary_substitutes_label_and_appends_goal() {
        let prompts = PromptSet::default();
        let (system, user) = summary_messages(&prompts, &conversation(), "Scene", "Describe it");
        assert!(system.contains("Scene design"));
        assert!(!system.contains("{contentType}"));
        assert!(user.starts_with("Conversation content:\nUser: A foggy hillside at dawn\nAI:"));
        assert!(user.ends_with("Final task goal: Describe it"));
    }

    #[test]
    fn summary_request_uses_summary_stage() {
        let req = summary_request(
            &PromptSet::default(),
            &StageConfig::summary(),
            &conversation(),
            "Scene",
            "goal",
        );
        assert_eq!(req.model, "gpt-4.1-nano");
        assert_eq!(req.max_tokens, 1000);
        assert_eq!(req.messages.len(), 2);
    }

    #[test]
    fn intent_reply_parses_and_clamps() {
        let reply = "```json\n{\"should_use\": true, \"summary\": \"Stone hillside\", \"confidence\": 1.4}\n```";
        let a = IntentAssessment::from_reply(reply).unwrap();
        assert!(a.should_use);
        assert_eq!(a.summary, "Stone hillside");
        assert_eq!(a.confidence, 1.0);
    }

    #[test]
    fn unreadable_intent_reply_is_none() {
        assert_eq!(IntentAssessment::from_reply("no idea"), None);
        assert_eq!(IntentAssessment::from_reply("{\"should_use\": \"maybe\"}"), None);
    }

    #[test]
    fn intent_request_is_low_temperature() {
        let req = intent_request(&StageConfig::summary(), &conversation(), "Scene");
        assert_eq!(req.temperature, INTENT_TEMPERATURE);
        assert!(req.user_text().contains("Content type: Scene"));
    }
}
