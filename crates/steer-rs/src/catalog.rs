//! Static vocabulary shared by every stage: conversational states, strategy
//! names, and frame (dimension) identifiers.
//!
//! Every table here is immutable for the lifetime of the process. The
//! inference stage embeds the tables in its instruction prompt, the validator
//! rejects identifiers outside them (via the serde/JSON Schema derive on each
//! enum), and the renderer uses [`Frame::term`] to turn internal identifiers
//! into user-facing vocabulary.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── States ─────────────────────────────────────────────────────────

/// The user's inferred conversational state.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
}

impl State {
    pub const ALL: [State; 12] = [
        State::S0,
        State::S1,
        State::S2,
        State::S3,
        State::S4,
        State::S5,
        State::S6,
        State::S7,
        State::S8,
        State::S9,
        State::S10,
        State::S11,
    ];

    /// The early-exploration state used by the fallback directive.
    pub const EARLY_EXPLORATION: State = State::S10;

    pub fn as_str(self) -> &'static str {
        match self {
            State::S0 => "S0",
            State::S1 => "S1",
            State::S2 => "S2",
            State::S3 => "S3",
            State::S4 => "S4",
            State::S5 => "S5",
            State::S6 => "S6",
            State::S7 => "S7",
            State::S8 => "S8",
            State::S9 => "S9",
            State::S10 => "S10",
            State::S11 => "S11",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            State::S0 => "No preference/Vague",
            State::S1 => "Direction set, needs refinement",
            State::S2 => "Too many candidates",
            State::S3 => "Needs comparison",
            State::S4 => "Leaning towards target",
            State::S5 => "Explicit opposition",
            State::S6 => "Wants uniqueness/memorable",
            State::S7 => "Off-topic",
            State::S8 => "Deadlock",
            State::S9 => "User takeover",
            State::S10 => "Early exploration phase",
            State::S11 => "Gentle discovery mode",
        }
    }

    /// States in which the user is still exploring broadly.
    pub fn is_exploratory(self) -> bool {
        matches!(self, State::S0 | State::S10 | State::S11)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Strategies ─────────────────────────────────────────────────────

/// A named conversational tactic.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    GentleExploration,
    BroadDiscovery,
    SoftIntroduction,
    CuriousQuestioning,
    OrganicNarrowing,
    SeedFrameUserLed,
    AskSlotsUserFirst,
    KeepRemoveUserAction,
    PairwiseCompareUserVote,
    LastTwoSoftCommit,
    BenefitReframeChoice,
    StoryValuePrompt,
    BringBackOnTopicLight,
    NeutralSwitchBrief,
    LockInTwoStep,
    CreditUserDecision,
    MagicianChoice,
}

impl StrategyName {
    pub const ALL: [StrategyName; 17] = [
        StrategyName::GentleExploration,
        StrategyName::BroadDiscovery,
        StrategyName::SoftIntroduction,
        StrategyName::CuriousQuestioning,
        StrategyName::OrganicNarrowing,
        StrategyName::SeedFrameUserLed,
        StrategyName::AskSlotsUserFirst,
        StrategyName::KeepRemoveUserAction,
        StrategyName::PairwiseCompareUserVote,
        StrategyName::LastTwoSoftCommit,
        StrategyName::BenefitReframeChoice,
        StrategyName::StoryValuePrompt,
        StrategyName::BringBackOnTopicLight,
        StrategyName::NeutralSwitchBrief,
        StrategyName::LockInTwoStep,
        StrategyName::CreditUserDecision,
        StrategyName::MagicianChoice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyName::GentleExploration => "gentle_exploration",
            StrategyName::BroadDiscovery => "broad_discovery",
            StrategyName::SoftIntroduction => "soft_introduction",
            StrategyName::CuriousQuestioning => "curious_questioning",
            StrategyName::OrganicNarrowing => "organic_narrowing",
            StrategyName::SeedFrameUserLed => "seed_frame_user_led",
            StrategyName::AskSlotsUserFirst => "ask_slots_user_first",
            StrategyName::KeepRemoveUserAction => "keep_remove_user_action",
            StrategyName::PairwiseCompareUserVote => "pairwise_compare_user_vote",
            StrategyName::LastTwoSoftCommit => "last_two_soft_commit",
            StrategyName::BenefitReframeChoice => "benefit_reframe_choice",
            StrategyName::StoryValuePrompt => "story_value_prompt",
            StrategyName::BringBackOnTopicLight => "bring_back_on_topic_light",
            StrategyName::NeutralSwitchBrief => "neutral_switch_brief",
            StrategyName::LockInTwoStep => "lock_in_two_step",
            StrategyName::CreditUserDecision => "credit_user_decision",
            StrategyName::MagicianChoice => "magician_choice",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StrategyName::GentleExploration => "Gentle exploration and curiosity",
            StrategyName::BroadDiscovery => "Broad discovery and understanding",
            StrategyName::SoftIntroduction => "Soft introduction of concepts",
            StrategyName::CuriousQuestioning => "Curious and open questioning",
            StrategyName::OrganicNarrowing => "Organic focus narrowing",
            StrategyName::SeedFrameUserLed => "User-led framework establishment",
            StrategyName::AskSlotsUserFirst => "Ask user priority details",
            StrategyName::KeepRemoveUserAction => "User-led filtering/selection",
            StrategyName::PairwiseCompareUserVote => "User voting comparison choice",
            StrategyName::LastTwoSoftCommit => "Soft confirmation of final two",
            StrategyName::BenefitReframeChoice => "Benefit reframing choice",
            StrategyName::StoryValuePrompt => "Story value prompt",
            StrategyName::BringBackOnTopicLight => "Gentle topic redirect",
            StrategyName::NeutralSwitchBrief => "Neutral quick switch",
            StrategyName::LockInTwoStep => "Two-step lock confirmation",
            StrategyName::CreditUserDecision => "Credit user decision",
            StrategyName::MagicianChoice => "Magician choice",
        }
    }

    /// Broad, open-ended strategies that never push toward a decision.
    pub fn is_exploration(self) -> bool {
        matches!(
            self,
            StrategyName::GentleExploration
                | StrategyName::BroadDiscovery
                | StrategyName::SoftIntroduction
                | StrategyName::CuriousQuestioning
        )
    }

    /// Strategies whose payload is a keep set or a pairwise comparison.
    /// The force policy keeps the target inside these payloads.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            StrategyName::KeepRemoveUserAction
                | StrategyName::PairwiseCompareUserVote
                | StrategyName::LastTwoSoftCommit
        )
    }

    /// Number of options a comparison strategy presents, if fixed.
    pub fn pair_size(self) -> Option<usize> {
        match self {
            StrategyName::PairwiseCompareUserVote | StrategyName::LastTwoSoftCommit => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Frames ─────────────────────────────────────────────────────────

/// A facet of the design space currently in focus.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Frame {
    #[serde(rename = "mood")]
    Mood,
    #[serde(rename = "lighting")]
    Lighting,
    #[serde(rename = "palette")]
    Palette,
    #[serde(rename = "style")]
    Style,
    #[serde(rename = "era/region", alias = "era_region")]
    EraRegion,
    #[serde(rename = "weather")]
    Weather,
    #[serde(rename = "composition")]
    Composition,
    #[serde(rename = "materials")]
    Materials,
    #[serde(rename = "clutter/density", alias = "clutter_density")]
    ClutterDensity,
    #[serde(rename = "story_cues")]
    StoryCues,
}

impl Frame {
    pub const ALL: [Frame; 10] = [
        Frame::Mood,
        Frame::Lighting,
        Frame::Palette,
        Frame::Style,
        Frame::EraRegion,
        Frame::Weather,
        Frame::Composition,
        Frame::Materials,
        Frame::ClutterDensity,
        Frame::StoryCues,
    ];

    /// The pair used whenever no frame could be inferred.
    pub const DEFAULT_PAIR: [Frame; 2] = [Frame::Mood, Frame::Style];

    pub fn as_str(self) -> &'static str {
        match self {
            Frame::Mood => "mood",
            Frame::Lighting => "lighting",
            Frame::Palette => "palette",
            Frame::Style => "style",
            Frame::EraRegion => "era/region",
            Frame::Weather => "weather",
            Frame::Composition => "composition",
            Frame::Materials => "materials",
            Frame::ClutterDensity => "clutter/density",
            Frame::StoryCues => "story_cues",
        }
    }

    /// User-facing vocabulary for this frame.
    pub fn term(self) -> &'static str {
        match self {
            Frame::Mood => "atmosphere",
            Frame::Lighting => "lighting",
            Frame::Palette => "color scheme",
            Frame::Style => "style",
            Frame::EraRegion => "era and regional feel",
            Frame::Weather => "weather",
            Frame::Composition => "composition and viewpoint",
            Frame::Materials => "materials",
            Frame::ClutterDensity => "level of detail",
            Frame::StoryCues => "narrative objects",
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Lookup helpers ─────────────────────────────────────────────────

/// Describe a state by its wire identifier (e.g. `"S4"`).
pub fn describe_state(id: &str) -> Option<&'static str> {
    State::ALL
        .iter()
        .find(|s| s.as_str() == id)
        .map(|s| s.description())
}

/// Describe a strategy by its wire identifier (e.g. `"magician_choice"`).
pub fn describe_strategy(id: &str) -> Option<&'static str> {
    StrategyName::ALL
        .iter()
        .find(|s| s.as_str() == id)
        .map(|s| s.description())
}

/// Render frames as a short phrase of user-facing terms, e.g.
/// `"atmosphere and style"`.
pub fn frame_phrase(frames: &[Frame]) -> String {
    let terms: Vec<&str> = frames.iter().map(|f| f.term()).collect();
    match terms.as_slice() {
        [] => "design elements".to_string(),
        [one] => (*one).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_ids_roundtrip_through_serde() {
        for state in State::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn strategy_wire_ids_match_as_str() {
        for name in StrategyName::ALL {
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, name.as_str());
        }
    }

    #[test]
    fn frame_accepts_underscore_aliases() {
        let f: Frame = serde_json::from_str("\"era_region\"").unwrap();
        assert_eq!(f, Frame::EraRegion);
        let f: Frame = serde_json::from_str("\"clutter/density\"").unwrap();
        assert_eq!(f, Frame::ClutterDensity);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(serde_json::from_str::<StrategyName>("\"hard_sell\"").is_err());
    }

    #[test]
    fn palette_maps_to_color_scheme() {
        assert_eq!(Frame::Palette.term(), "color scheme");
        assert_eq!(frame_phrase(&[Frame::Mood, Frame::Palette]), "atmosphere and color scheme");
        assert_eq!(frame_phrase(&[]), "design elements");
    }

    #[test]
    fn lookup_by_id() {
        assert_eq!(describe_state("S10"), Some("Early exploration phase"));
        assert_eq!(describe_strategy("magician_choice"), Some("Magician choice"));
        assert!(describe_state("S99").is_none());
    }

    #[test]
    fn comparison_strategies_have_expected_pair_sizes() {
        assert_eq!(StrategyName::PairwiseCompareUserVote.pair_size(), Some(2));
        assert_eq!(StrategyName::KeepRemoveUserAction.pair_size(), None);
        assert!(StrategyName::KeepRemoveUserAction.is_comparison());
        assert!(!StrategyName::GentleExploration.is_comparison());
    }
}
