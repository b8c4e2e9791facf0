//! Directive validation, repair, invariant enforcement, and the fallback
//! directive.
//!
//! Raw inference output goes through [`parse`] (structure plus JSON Schema),
//! then [`enforce`] (deterministic invariants the model cannot be trusted
//! with). [`resolve`] combines both with the fallback contract: whatever
//! happens upstream, a turn always gets a usable directive.

use crate::api::BackendError;
use crate::catalog::{Frame, State, StrategyName};
use crate::config::RepairPolicy;
use crate::directive::{Agency, ForcePolicy, StrategyCandidate, StrategyDirective, mentions};
use crate::turn::{ConversationTurnContext, InputError};
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum frames kept in a directive.
pub const MAX_FRAMES: usize = 2;
/// Maximum strategies kept in a directive.
pub const MAX_STRATEGIES: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("inference output is empty")]
    Empty,
    #[error("inference output spans {lines} lines, expected one")]
    MultiLine { lines: usize },
    #[error("inference output is not valid JSON: {0}")]
    Syntax(String),
    #[error("inference output is truncated and could not be repaired: {0}")]
    Truncated(String),
    #[error("directive failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("directive could not be decoded: {0}")]
    Decode(String),
}

/// A directive that passed structural and schema checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDirective {
    pub directive: StrategyDirective,
    /// True if closing tokens had to be appended.
    pub repaired: bool,
}

/// Why a turn runs on the fallback directive.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FallbackReason {
    #[error("invalid turn input: {0}")]
    Input(#[from] InputError),
    #[error("inference call failed: {0}")]
    Backend(#[from] BackendError),
    #[error("inference output rejected: {0}")]
    Parse(#[from] ParseError),
}

/// Where a turn's directive came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveSource {
    Inferred { repaired: bool },
    Fallback(FallbackReason),
}

impl DirectiveSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DirectiveSource::Fallback(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDirective {
    pub directive: StrategyDirective,
    pub source: DirectiveSource,
}

// ── Parse ──────────────────────────────────────────────────────────

fn schema_validator() -> Option<&'static jsonschema::Validator> {
    static VALIDATOR: OnceLock<Option<jsonschema::Validator>> = OnceLock::new();
    VALIDATOR
        .get_or_init(|| {
            let schema = crate::directive::directive_schema();
            match jsonschema::validator_for(&schema) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Directive schema failed to compile: {e}");
                    None
                }
            }
        })
        .as_ref()
}

/// Parse raw inference output into a directive.
///
/// The text must be a single line holding one JSON object. With
/// [`RepairPolicy::Lenient`], output cut off mid-object gets exactly one
/// repair attempt: the minimal closing brackets are appended and the result
/// must still pass schema validation.
pub fn parse(raw: &str, policy: RepairPolicy) -> Result<ParsedDirective, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
    if lines > 1 {
        return Err(ParseError::MultiLine { lines });
    }

    let (mut value, repaired) = match serde_json::from_str::<Value>(text) {
        Ok(v) => (v, false),
        Err(e) if e.is_eof() && policy == RepairPolicy::Lenient => {
            let closers = closing_tokens(text)
                .ok_or_else(|| ParseError::Truncated(e.to_string()))?;
            let patched = format!("{text}{closers}");
            debug!("Repairing truncated directive by appending {closers:?}");
            let v = serde_json::from_str::<Value>(&patched)
                .map_err(|e2| ParseError::Truncated(e2.to_string()))?;
            (v, true)
        }
        Err(e) if e.is_eof() => return Err(ParseError::Truncated(e.to_string())),
        Err(e) => return Err(ParseError::Syntax(e.to_string())),
    };

    normalize_frame_aliases(&mut value);

    if let Some(validator) = schema_validator() {
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if !errors.is_empty() {
            return Err(ParseError::Schema(errors));
        }
    }

    let directive: StrategyDirective =
        serde_json::from_value(value).map_err(|e| ParseError::Decode(e.to_string()))?;
    Ok(ParsedDirective {
        directive,
        repaired,
    })
}

/// The brackets needed to close `text`, innermost first. `None` if the text
/// ends inside a string, after a dangling separator, or has nothing open.
fn closing_tokens(text: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
            }
            _ => {}
        }
    }
    let dangling = matches!(text.trim_end().chars().last(), Some(',' | ':'));
    if in_string || dangling || stack.is_empty() {
        return None;
    }
    Some(stack.iter().rev().collect())
}

/// Rewrite underscore spellings of slash-named frames before schema
/// validation, which only knows the canonical names.
fn normalize_frame_aliases(value: &mut Value) {
    let Some(frames) = value.get_mut("frames").and_then(Value::as_array_mut) else {
        return;
    };
    for frame in frames.iter_mut() {
        let canonical = match frame.as_str() {
            Some("era_region") => Frame::EraRegion.as_str(),
            Some("clutter_density") => Frame::ClutterDensity.as_str(),
            _ => continue,
        };
        *frame = Value::String(canonical.to_string());
    }
}

// ── Enforce ────────────────────────────────────────────────────────

/// Apply the invariants every accepted directive must satisfy.
pub fn enforce(
    mut directive: StrategyDirective,
    ctx: &ConversationTurnContext,
    early_turn_threshold: u32,
) -> StrategyDirective {
    let target = ctx.hidden_target.clone();
    directive.target = target.clone();

    let mut frames = Vec::with_capacity(MAX_FRAMES);
    for f in directive.frames {
        if !frames.contains(&f) {
            frames.push(f);
        }
    }
    frames.truncate(MAX_FRAMES);
    directive.frames = frames;

    directive.strategies.sort_by_key(|s| s.priority);
    directive.strategies.truncate(MAX_STRATEGIES);

    if ctx.is_early(early_turn_threshold) {
        promote_exploration(&mut directive.strategies);
    }

    if directive.force_policy.holds(ctx.consecutive_rejects) {
        let soft_default = directive.force_policy.soft_default_to_target;
        for s in &mut directive.strategies {
            keep_target_in_play(s, &target, soft_default);
        }
    }

    if let Some(terms) = directive.agency.mirror_terms.take() {
        let kept: Vec<String> = terms
            .into_iter()
            .filter(|t| !t.trim().is_empty() && !mentions(t, &target))
            .collect();
        directive.agency.mirror_terms = (!kept.is_empty()).then_some(kept);
    }

    if directive.proposal.as_deref().is_some_and(|p| p.trim().is_empty()) {
        directive.proposal = None;
    }

    directive
}

/// Make an exploration strategy the lead, renumbering priorities 1..n.
fn promote_exploration(strategies: &mut Vec<StrategyCandidate>) {
    if strategies.first().is_some_and(|s| s.name.is_exploration()) {
        return;
    }
    let lead = match strategies.iter().position(|s| s.name.is_exploration()) {
        Some(i) => strategies.remove(i),
        None => StrategyCandidate::new(StrategyName::GentleExploration, 1),
    };
    strategies.insert(0, lead);
    strategies.truncate(MAX_STRATEGIES);
    for (i, s) in strategies.iter_mut().enumerate() {
        s.priority = (i + 1) as u8;
    }
}

fn keep_target_in_play(s: &mut StrategyCandidate, target: &str, soft_default: bool) {
    let pair = s.name.pair_size();
    match s.keep.as_mut() {
        Some(keep) => {
            let window = pair.unwrap_or(keep.len()).min(keep.len());
            if !keep[..window].iter().any(|k| mentions(k, target)) {
                // A target already listed past the pair moves into it.
                match (pair, keep.iter().position(|k| mentions(k, target))) {
                    (Some(n), Some(at)) => keep.swap(n - 1, at),
                    (Some(n), None) if keep.len() >= n => keep[n - 1] = target.to_string(),
                    _ => keep.push(target.to_string()),
                }
            }
        }
        None if s.name.is_comparison() => s.keep = Some(vec![target.to_string()]),
        None => {}
    }

    if let Some(remove) = &mut s.remove {
        remove.retain(|r| !mentions(r, target));
    }

    if let Some(options) = s.choices.as_mut().and_then(|c| c.keep_options.as_mut())
        && !options.iter().any(|o| mentions(o, target))
    {
        options.push(target.to_string());
    }

    if let Some(magician) = &mut s.magician {
        if let Some(pool) = &mut magician.selection_pool
            && !pool.iter().any(|p| mentions(p, target))
        {
            pool.push(target.to_string());
        }
        if soft_default && magician.proposed_pick.is_none() {
            magician.proposed_pick = Some(target.to_string());
        }
    }
}

// ── Fallback ───────────────────────────────────────────────────────

/// The fixed directive used whenever inference cannot produce one.
pub fn fallback_directive(target: &str) -> StrategyDirective {
    StrategyDirective {
        state: State::EARLY_EXPLORATION,
        frames: Frame::DEFAULT_PAIR.to_vec(),
        target: target.trim().to_string(),
        strategies: vec![StrategyCandidate::new(StrategyName::GentleExploration, 1)],
        force_policy: ForcePolicy::default(),
        agency: Agency::permissive(),
        proposal: None,
        ask_rationale: None,
    }
}

/// Turn an inference result into the directive for this turn.
pub fn resolve(
    raw: Result<String, BackendError>,
    ctx: &ConversationTurnContext,
    policy: RepairPolicy,
    early_turn_threshold: u32,
) -> ResolvedDirective {
    let parsed = raw
        .map_err(FallbackReason::from)
        .and_then(|text| parse(&text, policy).map_err(FallbackReason::from));
    match parsed {
        Ok(ParsedDirective {
            directive,
            repaired,
        }) => ResolvedDirective {
            directive: enforce(directive, ctx, early_turn_threshold),
            source: DirectiveSource::Inferred { repaired },
        },
        Err(reason) => {
            warn!("Using fallback directive: {reason}");
            ResolvedDirective {
                directive: fallback_directive(&ctx.hidden_target),
                source: DirectiveSource::Fallback(reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BackendErrorKind;
    use crate::directive::{Choices, MagicianPayload};
    use crate::transcript::ConversationMessage;

    const TARGET: &str = "Medieval Castle";

    fn ctx(turn_index: u32, rejects: u32) -> ConversationTurnContext {
        let t = vec![ConversationMessage::user("I like quiet places")];
        let mut c = ConversationTurnContext::build(&t, TARGET, "Describe a scene", turn_index, 6)
            .unwrap();
        c.consecutive_rejects = rejects;
        c
    }

    fn pairwise(keep: &[&str]) -> StrategyDirective {
        StrategyDirective {
            state: State::S3,
            frames: vec![Frame::Mood],
            target: "wrong".into(),
            strategies: vec![
                StrategyCandidate::new(StrategyName::PairwiseCompareUserVote, 1)
                    .with_keep(keep.iter().copied()),
            ],
            force_policy: ForcePolicy::default(),
            agency: Agency::default(),
            proposal: None,
            ask_rationale: None,
        }
    }

    #[test]
    fn parses_single_line_directive() {
        let raw = r#"{"state":"S3","frames":["mood","era_region"],"target":"Medieval Castle","strategies":[{"name":"pairwise_compare_user_vote","priority":1,"keep":["Misty Forest","Medieval Castle"]}]}"#;
        let parsed = parse(raw, RepairPolicy::Strict).unwrap();
        assert!(!parsed.repaired);
        assert_eq!(parsed.directive.frames, vec![Frame::Mood, Frame::EraRegion]);
    }

    #[test]
    fn repairs_missing_closing_brace_once() {
        let raw = r#"{"state":"S1","target":"X","strategies":[{"name":"organic_narrowing","priority":1}]"#;
        let parsed = parse(raw, RepairPolicy::Lenient).unwrap();
        assert!(parsed.repaired);
        assert_eq!(parsed.directive.state, State::S1);
        assert!(matches!(
            parse(raw, RepairPolicy::Strict),
            Err(ParseError::Truncated(_))
        ));
    }

    #[test]
    fn repair_closes_nested_brackets_in_order() {
        assert_eq!(closing_tokens(r#"{"a":[{"b":1"#).as_deref(), Some("}]}"));
        assert_eq!(closing_tokens(r#"{"a":"unterminated"#), None);
        assert_eq!(closing_tokens(r#"{"a":1,"#), None);
        assert_eq!(closing_tokens(r#"{"a":"}{"#), None);
    }

    #[test]
    fn repaired_text_must_still_match_schema() {
        let raw = r#"{"state":"S1","target":"X","strategies":[]"#;
        assert!(matches!(
            parse(raw, RepairPolicy::Lenient),
            Err(ParseError::Schema(_))
        ));
    }

    #[test]
    fn rejects_unknown_vocabulary_and_shapes() {
        assert_eq!(parse("   ", RepairPolicy::Lenient), Err(ParseError::Empty));
        assert!(matches!(
            parse("{\"state\":\"S1\",\n\"target\":\"X\"}", RepairPolicy::Lenient),
            Err(ParseError::MultiLine { lines: 2 })
        ));
        assert!(matches!(
            parse("not json", RepairPolicy::Lenient),
            Err(ParseError::Syntax(_))
        ));
        let unknown = r#"{"state":"S1","target":"X","strategies":[{"name":"hard_sell","priority":1}]}"#;
        assert!(matches!(
            parse(unknown, RepairPolicy::Lenient),
            Err(ParseError::Schema(_))
        ));
        let bad_state = r#"{"state":"S42","target":"X","strategies":[{"name":"organic_narrowing","priority":1}]}"#;
        assert!(parse(bad_state, RepairPolicy::Lenient).is_err());
    }

    #[test]
    fn zero_priority_fails_schema() {
        let raw = r#"{"state":"S1","target":"X","strategies":[{"name":"organic_narrowing","priority":0}]}"#;
        assert!(matches!(
            parse(raw, RepairPolicy::Lenient),
            Err(ParseError::Schema(_))
        ));
    }

    #[test]
    fn enforce_overwrites_target_and_caps_lists() {
        let mut d = pairwise(&["Misty Forest", "Medieval Castle"]);
        d.frames = vec![Frame::Mood, Frame::Mood, Frame::Lighting, Frame::Style];
        d.strategies = vec![
            StrategyCandidate::new(StrategyName::NeutralSwitchBrief, 3),
            StrategyCandidate::new(StrategyName::OrganicNarrowing, 1),
            StrategyCandidate::new(StrategyName::AskSlotsUserFirst, 2),
            StrategyCandidate::new(StrategyName::StoryValuePrompt, 4),
        ];
        let d = enforce(d, &ctx(5, 0), 3);
        assert_eq!(d.target, TARGET);
        assert_eq!(d.frames, vec![Frame::Mood, Frame::Lighting]);
        let names: Vec<_> = d.strategies.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                StrategyName::OrganicNarrowing,
                StrategyName::AskSlotsUserFirst,
                StrategyName::NeutralSwitchBrief
            ]
        );
    }

    #[test]
    fn force_policy_injects_target_into_pair() {
        let d = enforce(pairwise(&["Misty Forest", "Sunlit Harbor"]), &ctx(5, 0), 3);
        assert_eq!(
            d.strategies[0].keep.as_deref(),
            Some(&["Misty Forest".to_string(), TARGET.to_string()][..])
        );
    }

    #[test]
    fn target_listed_past_the_pair_is_swapped_in() {
        let d = enforce(
            pairwise(&["Misty Forest", "Sunlit Harbor", "Medieval Castle"]),
            &ctx(5, 0),
            3,
        );
        assert_eq!(
            d.strategies[0].keep.as_deref(),
            Some(&["Misty Forest".to_string(), TARGET.to_string(), "Sunlit Harbor".to_string()][..])
        );
    }

    #[test]
    fn force_policy_releases_after_double_reject() {
        let d = enforce(pairwise(&["Misty Forest", "Sunlit Harbor"]), &ctx(5, 2), 3);
        assert!(
            !d.strategies[0]
                .keep
                .as_ref()
                .unwrap()
                .iter()
                .any(|k| mentions(k, TARGET))
        );
    }

    #[test]
    fn force_policy_fills_pools_and_strips_removals() {
        let mut d = pairwise(&[]);
        d.strategies = vec![
            StrategyCandidate::new(StrategyName::KeepRemoveUserAction, 1).with_choices(Choices {
                keep_options: Some(vec!["Desert Ruins".into()]),
                min_keep: Some(1),
                max_keep: Some(2),
            }),
            StrategyCandidate::new(StrategyName::MagicianChoice, 2).with_magician(
                MagicianPayload {
                    selection_pool: Some(vec!["Neon City".into()]),
                    ..Default::default()
                },
            ),
        ];
        d.strategies[0].remove = Some(vec!["medieval castle".into(), "Neon City".into()]);
        let d = enforce(d, &ctx(5, 0), 3);
        let s0 = &d.strategies[0];
        assert!(
            s0.choices
                .as_ref()
                .and_then(|c| c.keep_options.as_ref())
                .unwrap()
                .contains(&TARGET.to_string())
        );
        assert_eq!(s0.remove.as_deref(), Some(&["Neon City".to_string()][..]));
        let m = d.strategies[1].magician.as_ref().unwrap();
        assert!(m.selection_pool.as_ref().unwrap().contains(&TARGET.to_string()));
        assert_eq!(m.proposed_pick.as_deref(), Some(TARGET));
    }

    #[test]
    fn early_turns_promote_exploration() {
        let mut d = pairwise(&["Misty Forest", "Medieval Castle"]);
        d.strategies.push(StrategyCandidate::new(StrategyName::CuriousQuestioning, 2));
        let d = enforce(d, &ctx(1, 0), 3);
        assert_eq!(d.strategies[0].name, StrategyName::CuriousQuestioning);
        assert_eq!(d.strategies[0].priority, 1);
        assert_eq!(d.strategies[1].priority, 2);

        let d = enforce(pairwise(&["a", "b"]), &ctx(0, 0), 3);
        assert_eq!(d.strategies[0].name, StrategyName::GentleExploration);
        assert_eq!(d.strategies.len(), 2);
    }

    #[test]
    fn mirror_terms_never_carry_target() {
        let mut d = pairwise(&["a", "b"]);
        d.agency.mirror_terms = Some(vec!["quiet".into(), "a medieval castle vibe".into()]);
        let d = enforce(d, &ctx(5, 0), 3);
        assert_eq!(d.agency.mirror_terms, Some(vec!["quiet".to_string()]));
    }

    #[test]
    fn resolve_falls_back_on_backend_error() {
        let r = resolve(
            Err(BackendError::new(BackendErrorKind::ServerError, "HTTP 500")),
            &ctx(1, 0),
            RepairPolicy::Lenient,
            3,
        );
        assert!(r.source.is_fallback());
        assert_eq!(r.directive, fallback_directive(TARGET));
        assert_eq!(r.directive.state, State::S10);
        assert_eq!(r.directive.frames, vec![Frame::Mood, Frame::Style]);
    }

    #[test]
    fn resolve_reports_repair() {
        let raw = r#"{"state":"S1","target":"X","frames":["palette"],"strategies":[{"name":"organic_narrowing","priority":1}]"#;
        let r = resolve(Ok(raw.to_string()), &ctx(5, 0), RepairPolicy::Lenient, 3);
        assert_eq!(r.source, DirectiveSource::Inferred { repaired: true });
        assert_eq!(r.directive.target, TARGET);
    }
}
