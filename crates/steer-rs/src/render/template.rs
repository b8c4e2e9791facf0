//! Strategy templates.
//!
//! Each strategy maps to a [`Template`] variant. A variant declares the
//! slots it needs and the simpler variant to fall back to when a slot is
//! missing, so composition never fails outright: every chain ends at
//! [`Template::FrameQuestion`], which only needs a frame term.

use crate::catalog::StrategyName;
use crate::directive::{Agency, StrategyCandidate, StrategyDirective, mentions};
use serde::Serialize;

/// Indirect reference used in place of any slot value that contains the
/// hidden target.
pub const VEIL: &str = "the earlier idea";

/// Frame term used when the directive has no frames.
pub const DEFAULT_FRAME_TERM: &str = "overall look";

/// Directive fields a template can substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Keep0,
    Keep1,
    Pick,
    Proposal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    FrameQuestion,
    BroadDiscovery,
    SoftIntroduction,
    CuriousQuestion,
    OrganicNarrowing,
    SeedFrame,
    AskSlots,
    KeepRemove,
    Pairwise,
    LastTwo,
    SingleOption,
    BenefitReframe,
    StoryValue,
    BringBack,
    NeutralSwitch,
    LockIn,
    CreditUser,
    MagicianPick,
}

impl Template {
    pub fn for_strategy(name: StrategyName) -> Self {
        match name {
            StrategyName::GentleExploration => Template::FrameQuestion,
            StrategyName::BroadDiscovery => Template::BroadDiscovery,
            StrategyName::SoftIntroduction => Template::SoftIntroduction,
            StrategyName::CuriousQuestioning => Template::CuriousQuestion,
            StrategyName::OrganicNarrowing => Template::OrganicNarrowing,
            StrategyName::SeedFrameUserLed => Template::SeedFrame,
            StrategyName::AskSlotsUserFirst => Template::AskSlots,
            StrategyName::KeepRemoveUserAction => Template::KeepRemove,
            StrategyName::PairwiseCompareUserVote => Template::Pairwise,
            StrategyName::LastTwoSoftCommit => Template::LastTwo,
            StrategyName::BenefitReframeChoice => Template::BenefitReframe,
            StrategyName::StoryValuePrompt => Template::StoryValue,
            StrategyName::BringBackOnTopicLight => Template::BringBack,
            StrategyName::NeutralSwitchBrief => Template::NeutralSwitch,
            StrategyName::LockInTwoStep => Template::LockIn,
            StrategyName::CreditUserDecision => Template::CreditUser,
            StrategyName::MagicianChoice => Template::MagicianPick,
        }
    }

    pub fn required(self) -> &'static [Slot] {
        match self {
            Template::Pairwise | Template::LastTwo => &[Slot::Keep0, Slot::Keep1],
            Template::SingleOption => &[Slot::Keep0],
            Template::MagicianPick => &[Slot::Pick],
            Template::LockIn => &[Slot::Proposal],
            _ => &[],
        }
    }

    /// The next simpler template. `None` only for [`Template::FrameQuestion`].
    pub fn fallback(self) -> Option<Template> {
        match self {
            Template::FrameQuestion => None,
            Template::Pairwise | Template::LastTwo => Some(Template::SingleOption),
            Template::MagicianPick => Some(Template::SeedFrame),
            Template::LockIn => Some(Template::OrganicNarrowing),
            _ => Some(Template::FrameQuestion),
        }
    }

    /// Opening sentence. Placeholders: `{frame}`, `{keep0}`, `{keep1}`,
    /// `{pick}`, `{proposal}`.
    fn lead(self) -> &'static str {
        match self {
            Template::FrameQuestion => "That's a great starting point.",
            Template::BroadDiscovery => "There are so many directions we could take the {frame}.",
            Template::SoftIntroduction => "That's an intriguing direction.",
            Template::CuriousQuestion => "I find that really interesting.",
            Template::OrganicNarrowing => "It sounds like the {frame} is really speaking to you.",
            Template::SeedFrame => "The {frame} could be quite key here.",
            Template::AskSlots => "The direction is getting clearer, and the details are yours.",
            Template::KeepRemove => "Looking at these options, the {frame} sets them apart.",
            Template::Pairwise => "For the {frame}, both {keep0} and {keep1} have their own appeal.",
            Template::LastTwo => "It looks like we're down to {keep0} and {keep1}.",
            Template::SingleOption => "For the {frame}, {keep0} is worth a closer look.",
            Template::BenefitReframe => "I understand your concerns, so let's try another angle.",
            Template::StoryValue => "A scene becomes memorable when it hints at a story.",
            Template::BringBack => "That's a fun thought.",
            Template::NeutralSwitch => "Let's look at it from another side.",
            Template::LockIn => "It sounds like you're leaning towards {proposal}.",
            Template::CreditUser => "You've shaped this direction yourself.",
            Template::MagicianPick => "The {frame} might feel most natural here.",
        }
    }

    /// Closing question, same placeholders as [`lead`](Self::lead).
    fn question(self) -> &'static str {
        match self {
            Template::FrameQuestion => "What kind of {frame} feels most appealing to you right now?",
            Template::BroadDiscovery => "What excites you most when you picture your ideal scene?",
            Template::SoftIntroduction => {
                "Have you ever been drawn to a {frame} that creates a certain feeling?"
            }
            Template::CuriousQuestion => "When you think about the {frame}, what comes to mind?",
            Template::OrganicNarrowing => "Which of our directions feels closest to your vision?",
            Template::SeedFrame => "Which aspect would you like to start with?",
            Template::AskSlots => "For the {frame}, which elements would you like to use?",
            Template::KeepRemove => "Which ones feel most aligned with your vision?",
            Template::Pairwise => "Which direction would you lean towards?",
            Template::LastTwo => "Would you like to tentatively pick one and see how it develops?",
            Template::SingleOption => "Does that resonate, or would you rather explore something else?",
            Template::BenefitReframe => "What kind of {frame} would feel more suitable to you?",
            Template::StoryValue => "What detail in the {frame} would make yours one of a kind?",
            Template::BringBack => "Coming back to our scene, what {frame} are you picturing?",
            Template::NeutralSwitch => "How do you feel about the {frame}?",
            Template::LockIn => "Shall we go with that?",
            Template::CreditUser => "Which part of the {frame} would you like to settle next?",
            Template::MagicianPick => "How about we try {pick} first and see if it fits?",
        }
    }

    /// The template with placeholders spelled as directive paths, for the
    /// render prompt.
    pub fn guide(self) -> String {
        format!("{} {}", self.lead(), self.question())
            .replace("{frame}", "{frames[0]}")
            .replace("{keep0}", "\"{keep[0]}\"")
            .replace("{keep1}", "\"{keep[1]}\"")
            .replace("{pick}", "\"{magician.proposed_pick}\"")
            .replace("{proposal}", "\"{proposal}\"")
    }

    /// Whether the lead sentence is generic enough to be replaced by a
    /// mirror of the user's own words.
    fn lead_is_generic(self) -> bool {
        !self.lead().contains('{')
    }
}

// ── Slots ──────────────────────────────────────────────────────────

/// A substituted slot value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotText {
    /// Quoted as the user would see it.
    Literal(String),
    /// Indirect reference standing in for a value that names the target.
    Veiled(String),
}

impl SlotText {
    fn display(&self) -> String {
        match self {
            SlotText::Literal(v) => format!("\"{v}\""),
            SlotText::Veiled(v) => v.clone(),
        }
    }

    pub fn is_veiled(&self) -> bool {
        matches!(self, SlotText::Veiled(_))
    }
}

/// Slot values resolved from a directive and its lead strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slots {
    pub frame: &'static str,
    pub keep0: Option<SlotText>,
    pub keep1: Option<SlotText>,
    pub pick: Option<SlotText>,
    pub proposal: Option<SlotText>,
}

impl Slots {
    pub fn resolve(directive: &StrategyDirective, lead: Option<&StrategyCandidate>) -> Self {
        let target = directive.target.as_str();
        let veil = lead
            .and_then(|s| s.spec_str("target_cue"))
            .map(str::trim)
            .filter(|cue| !cue.is_empty() && !mentions(cue, target))
            .unwrap_or(VEIL)
            .to_string();
        let slot = |value: &str| {
            let value = value.trim();
            if mentions(value, target) {
                SlotText::Veiled(veil.clone())
            } else {
                SlotText::Literal(value.to_string())
            }
        };

        let keep0 = lead.and_then(|s| s.keep_at(0)).map(slot);
        let keep1 = lead.and_then(|s| s.keep_at(1)).map(slot);
        // Two identical references would read as one option.
        let keep1 = match (&keep0, keep1) {
            (Some(a), Some(b)) if a.display().eq_ignore_ascii_case(&b.display()) => None,
            (_, b) => b,
        };

        let pick = lead
            .and_then(|s| s.magician.as_ref())
            .and_then(|m| m.proposed_pick.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(slot);
        let proposal = directive
            .proposal
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(slot);

        Self {
            frame: directive
                .frames
                .first()
                .map_or(DEFAULT_FRAME_TERM, |f| f.term()),
            keep0,
            keep1,
            pick,
            proposal,
        }
    }

    fn get(&self, slot: Slot) -> Option<&SlotText> {
        match slot {
            Slot::Keep0 => self.keep0.as_ref(),
            Slot::Keep1 => self.keep1.as_ref(),
            Slot::Pick => self.pick.as_ref(),
            Slot::Proposal => self.proposal.as_ref(),
        }
    }

    pub fn satisfies(&self, template: Template) -> bool {
        template.required().iter().all(|s| self.get(*s).is_some())
    }

    fn fill(&self, pattern: &str) -> String {
        let text = |s: &Option<SlotText>| s.as_ref().map(SlotText::display).unwrap_or_default();
        pattern
            .replace("{frame}", self.frame)
            .replace("{keep0}", &text(&self.keep0))
            .replace("{keep1}", &text(&self.keep1))
            .replace("{pick}", &text(&self.pick))
            .replace("{proposal}", &text(&self.proposal))
    }
}

// ── Composition ────────────────────────────────────────────────────

/// Compose `template` into at most two sentences, or `None` if a required
/// slot is missing. Agency flags adjust wording without adding sentences.
pub fn compose(template: Template, slots: &Slots, agency: &Agency) -> Option<String> {
    if !slots.satisfies(template) {
        return None;
    }

    let mirror = agency
        .mirror_terms
        .as_ref()
        .and_then(|terms| terms.iter().map(|t| t.trim()).find(|t| !t.is_empty()));
    let lead = match mirror {
        Some(term) if template.lead_is_generic() => format!("I like that you brought up \"{term}\"."),
        _ => slots.fill(template.lead()),
    };

    let mut question = slots.fill(template.question());
    if template == Template::LockIn && agency.credit() {
        question = "It's entirely your call, so shall we go with that?".to_string();
    }
    if agency.undo()
        && let Some(stem) = question.strip_suffix('?')
    {
        question = format!("{stem}, knowing we can always change course?");
    }

    Some(format!("{lead} {question}"))
}

/// Walk the fallback chain from `start` and return the first template whose
/// slots are satisfied.
pub fn select(start: Template, slots: &Slots) -> Template {
    let mut current = start;
    while !slots.satisfies(current) {
        match current.fallback() {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}
