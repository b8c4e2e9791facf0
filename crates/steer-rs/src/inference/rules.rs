//! Deterministic cue-based classifier.
//!
//! Reads the latest user message for lexical cues and emits the same
//! single-line JSON directive the model would. Rules are checked in a fixed
//! order and the first match wins:
//!
//! | Cue | State | Lead strategy |
//! |-----|-------|---------------|
//! | takeover ("let me decide") | S9 | `credit_user_decision` |
//! | rejection ("not a fan") | S5 | `benefit_reframe_choice` |
//! | early turn | S10 | `gentle_exploration` |
//! | no design vocabulary | S7 | `bring_back_on_topic_light` |
//! | agreement naming the target | S4 | `lock_in_two_step` |
//! | comparison ("which", "or") | S3 | `pairwise_compare_user_vote` |
//! | overload ("too many") | S2 | `keep_remove_user_action` |
//! | uniqueness ("memorable") | S6 | `magician_choice` |
//! | vagueness ("not sure") | S0 | `seed_frame_user_led` |
//! | deadlock ("stuck") | S8 | `last_two_soft_commit` |
//! | anything else | S1 | `ask_slots_user_first` |

use super::{Classifier, ClassifyFuture};
use crate::catalog::{Frame, State, StrategyName};
use crate::config::EARLY_TURN_THRESHOLD;
use crate::cues;
use crate::directive::{
    Agency, Choices, ForcePolicy, MagicianPayload, StrategyCandidate, StrategyDirective, mentions,
};
use crate::turn::ConversationTurnContext;

/// Alternatives offered next to the target in comparison payloads.
pub const DEFAULT_DECOYS: &[&str] = &[
    "Misty Forest",
    "Sunlit Harbor",
    "Desert Oasis",
    "Floating Islands",
    "Quiet Village",
    "Neon City",
];

/// Used when every decoy overlaps the target.
const NEUTRAL_DECOY: &str = "a different direction";

/// Mirror terms taken from the user's own words.
const MIRROR_LIMIT: usize = 2;

#[derive(Debug, Clone)]
pub struct RuleClassifier {
    early_turn_threshold: u32,
    decoys: Vec<String>,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(EARLY_TURN_THRESHOLD)
    }
}

impl RuleClassifier {
    pub fn new(early_turn_threshold: u32) -> Self {
        Self {
            early_turn_threshold,
            decoys: DEFAULT_DECOYS.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn with_decoys<I, S>(mut self, decoys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoys = decoys.into_iter().map(Into::into).collect();
        self
    }

    /// The `n`th decoy that does not overlap the target, rotating with `n`.
    fn decoy(&self, n: u32, target: &str) -> String {
        let usable: Vec<&String> = self
            .decoys
            .iter()
            .filter(|d| !d.trim().is_empty() && !mentions(d, target) && !mentions(target, d))
            .collect();
        if usable.is_empty() {
            return NEUTRAL_DECOY.to_string();
        }
        usable[n as usize % usable.len()].clone()
    }

    /// Classify the turn into a directive.
    pub fn directive(&self, ctx: &ConversationTurnContext) -> StrategyDirective {
        use StrategyName::*;

        let text = cues::normalize(ctx.latest_user_text());
        let target = ctx.hidden_target.as_str();
        let decoy = self.decoy(ctx.turn_index, target);
        let pair = || vec![decoy.clone(), target.to_string()];
        let on_topic = cues::has_any(&text, cues::DESIGN_VOCABULARY)
            || !cues::detect_frames(&text).is_empty();

        let mut proposal = None;
        let (state, strategies) = if cues::has_any(&text, cues::TAKEOVER_CUES) {
            (
                State::S9,
                vec![
                    StrategyCandidate::new(CreditUserDecision, 1),
                    StrategyCandidate::new(SeedFrameUserLed, 2),
                ],
            )
        } else if cues::has_any(&text, cues::REJECT_CUES) {
            (
                State::S5,
                vec![
                    StrategyCandidate::new(BenefitReframeChoice, 1),
                    StrategyCandidate::new(NeutralSwitchBrief, 2),
                ],
            )
        } else if ctx.is_early(self.early_turn_threshold) {
            (
                State::EARLY_EXPLORATION,
                vec![
                    StrategyCandidate::new(GentleExploration, 1),
                    StrategyCandidate::new(BroadDiscovery, 2),
                    StrategyCandidate::new(CuriousQuestioning, 3),
                ],
            )
        } else if !on_topic {
            (
                State::S7,
                vec![
                    StrategyCandidate::new(BringBackOnTopicLight, 1),
                    StrategyCandidate::new(GentleExploration, 2),
                ],
            )
        } else if cues::has_any(&text, cues::AGREEMENT_CUES) && cues::refers_to_target(&text, target)
        {
            proposal = Some(target.to_string());
            (
                State::S4,
                vec![
                    StrategyCandidate::new(LockInTwoStep, 1),
                    StrategyCandidate::new(CreditUserDecision, 2),
                ],
            )
        } else if cues::has_any(&text, cues::COMPARISON_CUES) {
            (
                State::S3,
                vec![
                    StrategyCandidate::new(PairwiseCompareUserVote, 1).with_keep(pair()),
                    StrategyCandidate::new(LastTwoSoftCommit, 2).with_keep(pair()),
                ],
            )
        } else if cues::has_any(&text, cues::OVERLOAD_CUES) {
            let second = self.decoy(ctx.turn_index + 1, target);
            let mut options = vec![decoy.clone(), target.to_string()];
            if second != decoy {
                options.insert(1, second);
            }
            (
                State::S2,
                vec![
                    StrategyCandidate::new(KeepRemoveUserAction, 1).with_choices(Choices {
                        keep_options: Some(options),
                        min_keep: Some(1),
                        max_keep: Some(2),
                    }),
                    StrategyCandidate::new(PairwiseCompareUserVote, 2).with_keep(pair()),
                ],
            )
        } else if cues::has_any(&text, cues::UNIQUENESS_CUES) {
            (
                State::S6,
                vec![
                    StrategyCandidate::new(MagicianChoice, 1).with_magician(MagicianPayload {
                        selection_pool: Some(pair()),
                        proposed_pick: Some(target.to_string()),
                        decoy_policy: Some("one_plausible_alternative".to_string()),
                        on_hit_next: Some(LockInTwoStep.as_str().to_string()),
                        on_miss_next: Some(PairwiseCompareUserVote.as_str().to_string()),
                    }),
                    StrategyCandidate::new(StoryValuePrompt, 2),
                ],
            )
        } else if cues::has_any(&text, cues::VAGUE_CUES) {
            (
                State::S0,
                vec![
                    StrategyCandidate::new(SeedFrameUserLed, 1),
                    StrategyCandidate::new(SoftIntroduction, 2),
                ],
            )
        } else if cues::has_any(&text, cues::DEADLOCK_CUES) {
            (
                State::S8,
                vec![
                    StrategyCandidate::new(LastTwoSoftCommit, 1).with_keep(pair()),
                    StrategyCandidate::new(NeutralSwitchBrief, 2),
                ],
            )
        } else {
            (
                State::S1,
                vec![
                    StrategyCandidate::new(AskSlotsUserFirst, 1),
                    StrategyCandidate::new(OrganicNarrowing, 2),
                ],
            )
        };

        let mut frames = cues::detect_frames(&text);
        for f in Frame::DEFAULT_PAIR {
            if frames.len() < 2 && !frames.contains(&f) {
                frames.push(f);
            }
        }
        frames.truncate(2);

        let mirror = cues::mirrored_words(&text, target, MIRROR_LIMIT);
        StrategyDirective {
            state,
            frames,
            target: target.to_string(),
            strategies,
            force_policy: ForcePolicy::default(),
            agency: Agency {
                mirror_terms: (!mirror.is_empty()).then_some(mirror),
                ..Agency::permissive()
            },
            proposal,
            ask_rationale: None,
        }
    }
}

impl Classifier for RuleClassifier {
    fn classify<'a>(&'a self, ctx: &'a ConversationTurnContext) -> ClassifyFuture<'a> {
        let wire = self.directive(ctx).to_wire();
        Box::pin(futures::future::ready(Ok(wire)))
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepairPolicy;
    use crate::transcript::ConversationMessage;
    use crate::validator;

    const TARGET: &str = "Medieval Castle";

    fn classify(text: &str, turn: u32) -> StrategyDirective {
        let t = vec![ConversationMessage::user(text)];
        let ctx = ConversationTurnContext::build(&t, TARGET, "Describe a scene", turn, 6).unwrap();
        RuleClassifier::default().directive(&ctx)
    }

    #[test]
    fn early_turns_explore() {
        let d = classify("Hi, I like quiet places", 1);
        assert_eq!(d.state, State::S10);
        assert_eq!(d.strategies[0].name, StrategyName::GentleExploration);
        assert_eq!(d.frames, vec![Frame::Mood, Frame::Style]);
        assert_eq!(d.agency.mirror_terms, Some(vec!["quiet".to_string()]));
    }

    #[test]
    fn rejection_and_takeover_win_even_early() {
        assert_eq!(classify("I'm not a fan of that", 0).state, State::S5);
        assert_eq!(classify("Stop suggesting, let me decide", 0).state, State::S9);
    }

    #[test]
    fn agreement_on_target_proposes_lock_in() {
        let d = classify("Yes, I love the castle idea", 5);
        assert_eq!(d.state, State::S4);
        assert_eq!(d.strategies[0].name, StrategyName::LockInTwoStep);
        assert_eq!(d.proposal.as_deref(), Some(TARGET));
    }

    #[test]
    fn comparison_pairs_decoy_with_target() {
        let d = classify("Which setting would work better, forest or city?", 4);
        assert_eq!(d.state, State::S3);
        let keep = d.strategies[0].keep.as_ref().unwrap();
        assert_eq!(keep.len(), 2);
        assert_eq!(keep[1], TARGET);
        assert!(!mentions(&keep[0], TARGET));
    }

    #[test]
    fn off_topic_redirects() {
        let d = classify("What did you have for lunch today?", 6);
        assert_eq!(d.state, State::S7);
    }

    #[test]
    fn fallthrough_refines_direction() {
        let d = classify("A cozy scene with stone walls", 5);
        assert_eq!(d.state, State::S1);
        assert_eq!(d.frames, vec![Frame::Mood, Frame::Materials]);
    }

    #[test]
    fn decoys_overlapping_target_are_skipped() {
        let rules = RuleClassifier::default().with_decoys(["Old Castle Ruins", "Castle"]);
        assert_eq!(rules.decoy(0, "Castle"), NEUTRAL_DECOY);
        let rules = RuleClassifier::default().with_decoys(["Medieval Castle", "Misty Forest"]);
        assert_eq!(rules.decoy(0, TARGET), "Misty Forest");
        assert_eq!(rules.decoy(3, TARGET), "Misty Forest");
    }

    #[tokio::test]
    async fn wire_output_passes_validation() {
        let t = vec![ConversationMessage::user("So many places, too many to pick")];
        let ctx = ConversationTurnContext::build(&t, TARGET, "Describe a scene", 4, 6).unwrap();
        let raw = RuleClassifier::default().classify(&ctx).await.unwrap();
        assert!(!raw.contains('\n'));
        let parsed = validator::parse(&raw, RepairPolicy::Strict).unwrap();
        assert_eq!(parsed.directive.state, State::S2);
        assert!(!parsed.repaired);
    }
}
