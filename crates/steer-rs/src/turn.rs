//! Per-turn context handed to the inference stage.

use crate::cues;
use crate::transcript::{self, ConversationMessage};
use thiserror::Error;

/// Reasons a turn cannot be inferred from its inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("transcript window has no user message")]
    NoUserMessage,
    #[error("hidden target is empty")]
    EmptyTarget,
    #[error("open goal is empty")]
    EmptyGoal,
}

/// Everything the inference stage sees for one turn. Built fresh each turn
/// and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurnContext {
    pub transcript_window: Vec<ConversationMessage>,
    pub hidden_target: String,
    pub open_goal: String,
    pub turn_index: u32,
    /// Consecutive most-recent user messages that rejected the target.
    pub consecutive_rejects: u32,
}

impl ConversationTurnContext {
    /// Build a context from the full transcript, keeping the most recent
    /// `window_size` messages. The window always ends on the latest user
    /// message.
    pub fn build(
        transcript: &[ConversationMessage],
        hidden_target: &str,
        open_goal: &str,
        turn_index: u32,
        window_size: usize,
    ) -> Result<Self, InputError> {
        let hidden_target = hidden_target.trim();
        if hidden_target.is_empty() {
            return Err(InputError::EmptyTarget);
        }
        let open_goal = open_goal.trim();
        if open_goal.is_empty() {
            return Err(InputError::EmptyGoal);
        }

        let last_user = transcript
            .iter()
            .rposition(ConversationMessage::is_user)
            .ok_or(InputError::NoUserMessage)?;
        let upto = &transcript[..=last_user];
        let window = transcript::window(upto, window_size.max(1));

        Ok(Self {
            transcript_window: window.to_vec(),
            hidden_target: hidden_target.to_string(),
            open_goal: open_goal.to_string(),
            turn_index,
            consecutive_rejects: count_consecutive_rejects(transcript, hidden_target),
        })
    }

    /// The most recent user message in the window.
    pub fn latest_user_text(&self) -> &str {
        self.transcript_window
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map_or("", |m| m.text.as_str())
    }

    pub fn is_early(&self, early_turn_threshold: u32) -> bool {
        self.turn_index < early_turn_threshold
    }
}

/// Count trailing user messages that explicitly reject the target: a
/// rejection cue plus a significant target word. Assistant messages are
/// skipped; the first non-rejecting user message stops the count.
pub fn count_consecutive_rejects(transcript: &[ConversationMessage], target: &str) -> u32 {
    let mut count = 0;
    for msg in transcript.iter().rev().filter(|m| m.is_user()) {
        let normalized = cues::normalize(&msg.text);
        if cues::has_any(&normalized, cues::REJECT_CUES) && cues::refers_to_target(&normalized, target)
        {
            count += 1;
        } else {
            break;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "Medieval Castle";
    const GOAL: &str = "Create a detailed scene description";

    #[test]
    fn build_requires_user_message() {
        let t = vec![ConversationMessage::assistant("Welcome!")];
        assert_eq!(
            ConversationTurnContext::build(&t, TARGET, GOAL, 0, 6),
            Err(InputError::NoUserMessage)
        );
    }

    #[test]
    fn build_rejects_blank_target_and_goal() {
        let t = vec![ConversationMessage::user("hi")];
        assert_eq!(
            ConversationTurnContext::build(&t, "  ", GOAL, 0, 6),
            Err(InputError::EmptyTarget)
        );
        assert_eq!(
            ConversationTurnContext::build(&t, TARGET, "", 0, 6),
            Err(InputError::EmptyGoal)
        );
    }

    #[test]
    fn window_ends_on_latest_user_message() {
        let t = vec![
            ConversationMessage::user("one"),
            ConversationMessage::assistant("a"),
            ConversationMessage::user("two"),
            ConversationMessage::assistant("trailing reply"),
        ];
        let ctx = ConversationTurnContext::build(&t, TARGET, GOAL, 2, 2).unwrap();
        assert_eq!(ctx.transcript_window.len(), 2);
        assert_eq!(ctx.latest_user_text(), "two");
        assert_eq!(ctx.transcript_window[0].text, "a");
    }

    #[test]
    fn rejects_count_only_consecutive_target_rejections() {
        let t = vec![
            ConversationMessage::user("I don't like castles, not a fan of the castle idea"),
            ConversationMessage::user("Something with a forest please"),
            ConversationMessage::user("I really dislike anything medieval"),
            ConversationMessage::assistant("Understood."),
            ConversationMessage::user("No way, not a castle"),
        ];
        assert_eq!(count_consecutive_rejects(&t, TARGET), 2);
        assert_eq!(count_consecutive_rejects(&t[..2], TARGET), 0);
    }

    #[test]
    fn short_target_is_accepted_and_tracked() {
        let t = vec![ConversationMessage::user("No way, not Oz")];
        let ctx = ConversationTurnContext::build(&t, "Oz", GOAL, 4, 6).unwrap();
        assert_eq!(ctx.hidden_target, "Oz");
        assert_eq!(ctx.consecutive_rejects, 1);
    }

    #[test]
    fn early_turns_are_below_threshold() {
        let t = vec![ConversationMessage::user("Hi")];
        let ctx = ConversationTurnContext::build(&t, TARGET, GOAL, 2, 6).unwrap();
        assert!(ctx.is_early(3));
        assert!(!ctx.is_early(2));
    }
}
