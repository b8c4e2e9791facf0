//! The Strategy Directive: inference output and render input.
//!
//! A directive is created and discarded within a single turn. Field names
//! follow the single-line JSON contract the inference stage emits, so these
//! types double as the JSON Schema the validator checks model output against
//! (see [`directive_schema`]).

use crate::catalog::{Frame, State, StrategyName};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured intermediate output of the inference stage.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct StrategyDirective {
    pub state: State,
    /// At most two frames currently in focus.
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Hidden convergence value. Carried through, never rendered.
    pub target: String,
    #[schemars(length(min = 1))]
    pub strategies: Vec<StrategyCandidate>,
    #[serde(default)]
    pub force_policy: ForcePolicy,
    #[serde(default)]
    pub agency: Agency,
    #[serde(default)]
    pub proposal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_rationale: Option<bool>,
}

/// One ranked strategy with its optional payload.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct StrategyCandidate {
    pub name: StrategyName,
    /// 1 is the highest priority.
    #[schemars(range(min = 1))]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Choices>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magician: Option<MagicianPayload>,
}

impl StrategyCandidate {
    pub fn new(name: StrategyName, priority: u8) -> Self {
        Self {
            name,
            priority,
            choices: None,
            keep: None,
            remove: None,
            spec: None,
            magician: None,
        }
    }

    pub fn with_keep<I, S>(mut self, keep: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep = Some(keep.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_choices(mut self, choices: Choices) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_magician(mut self, magician: MagicianPayload) -> Self {
        self.magician = Some(magician);
        self
    }

    /// `keep[i]`, if present and non-blank.
    pub fn keep_at(&self, i: usize) -> Option<&str> {
        self.keep
            .as_ref()
            .and_then(|k| k.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// A string value from the free-form `spec` payload.
    pub fn spec_str(&self, key: &str) -> Option<&str> {
        self.spec
            .as_ref()
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_str())
    }
}

/// Option set offered to the user for a keep/remove action.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
pub struct Choices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_keep: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keep: Option<u32>,
}

/// "Magician's choice" payload: a pool presented as free choice with a
/// proposed pick the conversation leans toward.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
pub struct MagicianPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_pool: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_pick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoy_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_hit_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_miss_next: Option<String>,
}

/// How ties between the target and another option are resolved.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    FavorTarget,
    Neutral,
}

/// Rules that keep the hidden target in play.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct ForcePolicy {
    pub always_in_play: bool,
    pub double_reject_threshold: u32,
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default)]
    pub soft_default_to_target: bool,
}

impl Default for ForcePolicy {
    fn default() -> Self {
        Self {
            always_in_play: true,
            double_reject_threshold: 2,
            tie_break: TieBreak::FavorTarget,
            soft_default_to_target: true,
        }
    }
}

impl ForcePolicy {
    /// Whether the target must stay in comparison payloads given the number
    /// of consecutive turns in which the user rejected it.
    pub fn holds(&self, consecutive_rejects: u32) -> bool {
        self.always_in_play && consecutive_rejects < self.double_reject_threshold
    }
}

/// Signals that preserve the user's sense of control.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default, PartialEq)]
pub struct Agency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_offer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_alternatives: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_terms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_user: Option<bool>,
}

impl Agency {
    /// Every flag on, no mirror terms.
    pub fn permissive() -> Self {
        Self {
            undo_offer: Some(true),
            offer_alternatives: Some(true),
            mirror_terms: None,
            credit_user: Some(true),
        }
    }

    pub fn undo(&self) -> bool {
        self.undo_offer.unwrap_or(false)
    }

    pub fn credit(&self) -> bool {
        self.credit_user.unwrap_or(false)
    }
}

impl StrategyDirective {
    /// The strategy with the numerically lowest priority; ties resolve to
    /// the first listed.
    pub fn lead_strategy(&self) -> Option<&StrategyCandidate> {
        self.strategies.iter().min_by_key(|s| s.priority)
    }

    /// Strategies in priority order, list order within a priority.
    pub fn ranked(&self) -> Vec<&StrategyCandidate> {
        let mut ranked: Vec<&StrategyCandidate> = self.strategies.iter().collect();
        ranked.sort_by_key(|s| s.priority);
        ranked
    }

    /// Serialize as the single-line JSON wire form.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Case-insensitive check for `needle` inside `haystack`. An empty needle
/// never matches.
pub fn mentions(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// JSON Schema for [`StrategyDirective`], as a `serde_json::Value`.
pub fn directive_schema() -> serde_json::Value {
    crate::json_schema_for::<StrategyDirective>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(strategies: Vec<StrategyCandidate>) -> StrategyDirective {
        StrategyDirective {
            state: State::S3,
            frames: vec![Frame::Mood],
            target: "Medieval Castle".into(),
            strategies,
            force_policy: ForcePolicy::default(),
            agency: Agency::default(),
            proposal: None,
            ask_rationale: None,
        }
    }

    #[test]
    fn lead_strategy_is_lowest_priority_first_listed() {
        let d = directive(vec![
            StrategyCandidate::new(StrategyName::BroadDiscovery, 2),
            StrategyCandidate::new(StrategyName::SoftIntroduction, 1),
            StrategyCandidate::new(StrategyName::CuriousQuestioning, 1),
        ]);
        assert_eq!(
            d.lead_strategy().map(|s| s.name),
            Some(StrategyName::SoftIntroduction)
        );
        let names: Vec<_> = d.ranked().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                StrategyName::SoftIntroduction,
                StrategyName::CuriousQuestioning,
                StrategyName::BroadDiscovery
            ]
        );
    }

    #[test]
    fn wire_form_is_single_line_and_parses_back() {
        let d = directive(vec![
            StrategyCandidate::new(StrategyName::PairwiseCompareUserVote, 1)
                .with_keep(["Misty Forest", "Medieval Castle"]),
        ]);
        let wire = d.to_wire();
        assert!(!wire.contains('\n'));
        let back: StrategyDirective = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn missing_optional_sections_take_defaults() {
        let d: StrategyDirective = serde_json::from_str(
            r#"{"state":"S1","target":"X","strategies":[{"name":"organic_narrowing","priority":1}]}"#,
        )
        .unwrap();
        assert!(d.frames.is_empty());
        assert_eq!(d.force_policy, ForcePolicy::default());
        assert!(d.proposal.is_none());
    }

    #[test]
    fn force_policy_releases_after_threshold() {
        let p = ForcePolicy::default();
        assert!(p.holds(0));
        assert!(p.holds(1));
        assert!(!p.holds(2));
        let off = ForcePolicy {
            always_in_play: false,
            ..ForcePolicy::default()
        };
        assert!(!off.holds(0));
    }

    #[test]
    fn mentions_is_case_insensitive_and_ignores_empty() {
        assert!(mentions("the MEDIEVAL castle at dusk", "Medieval Castle"));
        assert!(!mentions("a misty forest", "Medieval Castle"));
        assert!(!mentions("anything", "  "));
    }

    #[test]
    fn schema_lists_strategy_vocabulary() {
        let schema = directive_schema().to_string();
        assert!(schema.contains("pairwise_compare_user_vote"));
        assert!(schema.contains("S11"));
    }
}
