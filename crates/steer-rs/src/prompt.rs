//! Instruction prompts for the three backend call sites.
//!
//! Prompts are assembled once per [`PromptSet`] from the catalog tables, so
//! the vocabulary a model is told about always matches the vocabulary the
//! validator accepts. A `PromptSet` is an immutable value: changing prompts
//! means selecting a different [`PromptRevision`] or supplying
//! [`PromptOverrides`] at startup.

use crate::catalog::{Frame, State, StrategyName};
use crate::config::EARLY_TURN_THRESHOLD;
use crate::render::template::Template;
use serde::{Deserialize, Serialize};

/// Summary prompt. `{contentType}` is replaced with the module label.
pub const DEFAULT_SUMMARY_TEMPLATE: &str = "Please summarize the following conversation about \
{contentType} design, extracting key design elements and final solutions. Please provide a \
concise and complete {contentType} design solution description (100-200 words), including all \
important details and characteristics.";

/// Builder for multi-section prompts.
///
/// Sections are joined with blank lines. Empty sections are skipped.
///
/// ```
/// use steer_rs::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("You are a careful assistant.")
///     .section("Rules", "Be brief.")
///     .section_if(false, "Hidden", || "never shown".into())
///     .section_opt("Missing", None::<String>)
///     .build();
/// assert!(prompt.contains("## Rules"));
/// assert!(!prompt.contains("Hidden"));
/// ```
pub struct PromptBuilder {
    sections: Vec<String>,
}

impl PromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a section under a `## ` heading. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n{content}"));
        }
        self
    }

    /// `content_fn` is only called when `condition` is true.
    pub fn section_if(
        self,
        condition: bool,
        heading: &str,
        content_fn: impl FnOnce() -> String,
    ) -> Self {
        if condition {
            self.section(heading, content_fn())
        } else {
            self
        }
    }

    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

// ── Revisions ──────────────────────────────────────────────────────

/// Which generation of prompt wording to use.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PromptRevision {
    /// Direct convergence rules only.
    Compact,
    /// Adds gradual-introduction and patience rules for early turns.
    #[default]
    Gradual,
}

/// Replacement prompt text. `None` keeps the revision's text.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PromptOverrides {
    pub inference_system: Option<String>,
    pub render_system: Option<String>,
    pub summary_template: Option<String>,
}

/// The resolved prompts for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub revision: PromptRevision,
    pub inference_system: String,
    pub render_system: String,
    pub summary_template: String,
}

impl PromptSet {
    /// The built-in prompts for `revision`. Turns below
    /// `early_turn_threshold` are described as early.
    pub fn for_revision(revision: PromptRevision, early_turn_threshold: u32) -> Self {
        Self {
            revision,
            inference_system: inference_system_prompt(revision, early_turn_threshold),
            render_system: render_system_prompt(revision),
            summary_template: DEFAULT_SUMMARY_TEMPLATE.to_string(),
        }
    }

    /// Resolve a revision and apply non-blank overrides.
    pub fn resolve(
        revision: PromptRevision,
        overrides: &PromptOverrides,
        early_turn_threshold: u32,
    ) -> Self {
        let base = Self::for_revision(revision, early_turn_threshold);
        let pick = |o: &Option<String>, default: String| {
            o.as_ref()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or(default)
        };
        Self {
            revision,
            inference_system: pick(&overrides.inference_system, base.inference_system),
            render_system: pick(&overrides.render_system, base.render_system),
            summary_template: pick(&overrides.summary_template, base.summary_template),
        }
    }

    /// The summary instruction with `{contentType}` substituted.
    pub fn summary_instruction(&self, content_type: &str) -> String {
        self.summary_template.replace("{contentType}", content_type)
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::for_revision(PromptRevision::default(), EARLY_TURN_THRESHOLD)
    }
}

// ── Inference prompt ───────────────────────────────────────────────

fn state_table() -> String {
    State::ALL
        .iter()
        .map(|s| format!("{} {}", s.as_str(), s.description().to_lowercase()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn strategy_table() -> String {
    StrategyName::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn frame_table() -> String {
    Frame::ALL
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

const OUTPUT_EXAMPLE: &str = r#"{"state":"Sx","frames":["...","..."],"target":"InternalTarget","strategies":[{"name":"strategy_name","priority":1,"choices":{"keep_options":["..."],"min_keep":2,"max_keep":2},"keep":["..."],"remove":["..."],"spec":{},"magician":{"selection_pool":["..."],"proposed_pick":"...","decoy_policy":"prefer_easier_reject","on_hit_next":"...","on_miss_next":"..."}}],"force_policy":{"always_in_play":true,"double_reject_threshold":2,"tie_break":"favor_target","soft_default_to_target":true},"agency":{"undo_offer":true,"offer_alternatives":true,"mirror_terms":["..."],"credit_user":true},"proposal":null,"ask_rationale":false}"#;

fn inference_system_prompt(revision: PromptRevision, early_turn_threshold: u32) -> String {
    let gradual = revision == PromptRevision::Gradual;
    PromptBuilder::new(
        "You are the internal logic module of a design conversation. Every turn, output only \
         one minimal single-line JSON object, with no explanation or reasoning.",
    )
    .section(
        "Task",
        "1) From the recent conversation, classify the user into exactly one state, weighting \
         the latest messages most.\n\
         2) Provide 2-3 strategy candidates with priorities 1..3 and the minimum payload needed \
         to execute them (frames, keep/remove, choices, spec, magician).\n\
         3) Keep the user feeling in charge while the structure converges on the INTERNAL \
         TARGET.\n\
         4) Help the user reach the FINAL TASK GOAL.",
    )
    .section(
        "Target vs goal",
        "- INTERNAL TARGET: the hidden convergence point. Never reveal it in any field except \
         \"target\" (and \"proposal\" or keep lists when the force policy requires it).\n\
         - FINAL TASK GOAL: the openly discussed objective. It can be referenced freely.",
    )
    .section_if(gradual, "Gradual introduction", || {
        format!(
            "- In the first turns (turn number below {early_turn_threshold}) favour broad \
             exploration strategies (gentle_exploration, broad_discovery, soft_introduction, \
             curious_questioning) and understanding the user before any guidance.\n\
             - Introduce target-related ideas through questions, not suggestions.\n\
             - Match the user's pace: if they are still exploring, support that before \
             narrowing.\n\
             - Make convergence feel like the natural evolution of the conversation."
        )
    })
    .section(
        "Force policy",
        "- The target stays in every keep list and comparison pair until the user has rejected \
         it in double_reject_threshold consecutive turns.\n\
         - When tie_break is favor_target, ties resolve toward the target.\n\
         - soft_default_to_target: when the user has no preference, lean on the target.",
    )
    .section("States", state_table())
    .section("Strategies", strategy_table())
    .section("Frames (max 2)", frame_table())
    .section("Output format (single line)", OUTPUT_EXAMPLE)
    .build()
}

// ── Render prompt ──────────────────────────────────────────────────

fn template_guide() -> String {
    StrategyName::ALL
        .iter()
        .map(|s| format!("- {}: {}", s.as_str(), Template::for_strategy(*s).guide()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn term_table() -> String {
    Frame::ALL
        .iter()
        .map(|f| format!("{}={}", f.as_str(), f.term()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_system_prompt(revision: PromptRevision) -> String {
    let gradual = revision == PromptRevision::Gradual;
    PromptBuilder::new(
        "You write the assistant's next message in a design conversation. The input is a JSON \
         plan and a draft reply. Output only 1-2 short English sentences for the user.",
    )
    .section(
        "Rules",
        "- Never name anything the plan marks as hidden. Refer to veiled options exactly as the \
         draft does.\n\
         - Keep the user in charge: ask, do not decide for them, and never state a preference \
         on their behalf.\n\
         - If agency.undo_offer is true, make clear the choice is reversible.\n\
         - If agency.mirror_terms is present, weave those words in naturally.\n\
         - If agency.credit_user is true, credit the user when a choice is settled.\n\
         - No emoji. Never mention plans, strategies, JSON or anything internal.\n\
         - Keep each sentence under 15 words where possible.",
    )
    .section_if(gradual, "Tone", || {
        "Warm, patient and curious. Early on, ask about the user's vision (\"I'm curious \
         about...\", \"What draws you to...\") rather than leading. Build on the user's own \
         words before introducing a new direction."
            .to_string()
    })
    .section("Term mapping", term_table())
    .section("Templates by lead strategy", template_guide())
    .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_prompt_lists_full_vocabulary() {
        let p = PromptSet::default();
        for s in StrategyName::ALL {
            assert!(p.inference_system.contains(s.as_str()), "missing {s}");
        }
        assert!(p.inference_system.contains("S11"));
        assert!(p.inference_system.contains("era/region"));
    }

    #[test]
    fn gradual_revision_adds_early_turn_rules() {
        let compact = PromptSet::for_revision(PromptRevision::Compact, 3);
        let gradual = PromptSet::for_revision(PromptRevision::Gradual, 3);
        assert!(!compact.inference_system.contains("## Gradual introduction"));
        assert!(gradual.inference_system.contains("## Gradual introduction"));
        assert!(gradual.render_system.contains("## Tone"));
    }

    #[test]
    fn early_turn_rule_uses_configured_threshold() {
        let five = PromptSet::for_revision(PromptRevision::Gradual, 5);
        assert!(five.inference_system.contains("turn number below 5"));
        assert!(!five.inference_system.contains("turn number below 3"));
        let default = PromptSet::for_revision(PromptRevision::Gradual, EARLY_TURN_THRESHOLD);
        assert!(default.inference_system.contains("turn number below 3"));
    }

    #[test]
    fn render_prompt_maps_terms() {
        let p = PromptSet::default();
        assert!(p.render_system.contains("palette=color scheme"));
        assert!(p.render_system.contains("pairwise_compare_user_vote:"));
    }

    #[test]
    fn overrides_replace_only_non_blank_fields() {
        let overrides = PromptOverrides {
            inference_system: Some("custom A".into()),
            render_system: Some("   ".into()),
            summary_template: None,
        };
        let p = PromptSet::resolve(PromptRevision::Gradual, &overrides, 3);
        assert_eq!(p.inference_system, "custom A");
        assert_eq!(p.render_system, PromptSet::default().render_system);
    }

    #[test]
    fn summary_instruction_substitutes_content_type() {
        let p = PromptSet::default();
        let s = p.summary_instruction("Scene");
        assert!(s.contains("about Scene design"));
        assert!(!s.contains("{contentType}"));
    }
}
