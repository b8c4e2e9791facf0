//! Dialogue rendering: directive in, one or two sentences out.
//!
//! Rendering always starts from a deterministic [template](template) draft
//! chosen by the lead strategy. In [`RenderMode::Llm`] the draft and a
//! redacted copy of the directive go to the render model for polishing; the
//! model's text is used only if it passes every [guard](guard) check.
//!
//! | Situation | Output |
//! |-----------|--------|
//! | Model text passes the guard | model text |
//! | Model text violates the guard | template draft |
//! | Backend error or empty reply | frames-only question |
//! | Template-only mode | template draft |

pub mod guard;
pub mod template;

use crate::api::{Backend, BackendError, complete_within};
use crate::catalog::{Frame, frame_phrase};
use crate::config::{RenderMode, StageConfig};
use crate::directive::{StrategyDirective, mentions};
use crate::{ChatRequest, Message};
use guard::Violation;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use template::{Slots, Template, VEIL};
use tracing::{debug, warn};

/// Questions tried in order when nothing else passes the guard.
const LAST_RESORT: [&str; 3] = [
    "What would you like to explore next?",
    "Tell me more about your idea.",
    "Go on.",
];

/// Where an utterance's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "template")]
pub enum UtteranceOrigin {
    Model,
    Template(Template),
    FramesOnly,
    LastResort,
}

/// The text shown to the user this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedUtterance {
    pub text: String,
    pub origin: UtteranceOrigin,
}

/// Render result plus what went wrong along the way, for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub utterance: RenderedUtterance,
    pub backend_error: Option<BackendError>,
    pub violation: Option<Violation>,
}

/// Borrowed settings for one render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings<'a> {
    pub stage: &'a StageConfig,
    pub system_prompt: &'a str,
    pub mode: RenderMode,
    pub timeout: Duration,
}

/// The generic exploration question built from frames alone. Used when the
/// render backend fails.
pub fn frames_only_question(frames: &[Frame]) -> String {
    format!(
        "I'm curious about your vision. What kind of {} feels most appealing to you right now?",
        frame_phrase(frames)
    )
}

/// The deterministic utterance for a directive: the lead strategy's
/// template, degraded along its fallback chain until a draft passes the
/// guard, then the frames-only question, then a last-resort question.
pub fn draft(directive: &StrategyDirective) -> RenderedUtterance {
    let lead = directive.lead_strategy();
    let slots = Slots::resolve(directive, lead);
    let target = directive.target.as_str();

    let mut current = Some(template::select(
        lead.map_or(Template::FrameQuestion, |s| Template::for_strategy(s.name)),
        &slots,
    ));
    while let Some(t) = current {
        if let Some(text) = template::compose(t, &slots, &directive.agency) {
            match guard::check(&text, target) {
                Ok(()) => {
                    return RenderedUtterance {
                        text,
                        origin: UtteranceOrigin::Template(t),
                    };
                }
                Err(v) => debug!("Template {t:?} rejected: {v}"),
            }
        }
        current = t.fallback().map(|next| template::select(next, &slots));
    }

    let text = frames_only_question(&directive.frames);
    if guard::check(&text, target).is_ok() {
        return RenderedUtterance {
            text,
            origin: UtteranceOrigin::FramesOnly,
        };
    }

    let text = LAST_RESORT
        .iter()
        .copied()
        .find(|q| guard::check(q, target).is_ok())
        .unwrap_or_else(|| bare_prompt(target));
    RenderedUtterance {
        text: text.to_string(),
        origin: UtteranceOrigin::LastResort,
    }
}

/// A one-character prompt. It can only contain a one-character target, and
/// the two candidates differ, so one of them never names `target`.
fn bare_prompt(target: &str) -> &'static str {
    if mentions("?", target) { "." } else { "?" }
}

/// Render the frames-only fallback, degrading further only if the frames
/// phrase itself trips the guard.
fn frames_only(directive: &StrategyDirective) -> RenderedUtterance {
    let text = frames_only_question(&directive.frames);
    if guard::check(&text, &directive.target).is_ok() {
        RenderedUtterance {
            text,
            origin: UtteranceOrigin::FramesOnly,
        }
    } else {
        draft(directive)
    }
}

/// A copy of the directive safe to show the render model: the `target`
/// field removed and every string naming the target replaced by the veil.
pub fn redact(directive: &StrategyDirective) -> Value {
    fn walk(value: &mut Value, target: &str) {
        match value {
            Value::String(s) if mentions(s, target) => *s = VEIL.to_string(),
            Value::Array(items) => items.iter_mut().for_each(|v| walk(v, target)),
            Value::Object(map) => map.values_mut().for_each(|v| walk(v, target)),
            _ => {}
        }
    }
    let mut value = serde_json::to_value(directive).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("target");
    }
    walk(&mut value, &directive.target);
    value
}

fn render_request(
    directive: &StrategyDirective,
    draft: &str,
    settings: &RenderSettings<'_>,
) -> ChatRequest {
    let plan = redact(directive);
    let user = format!(
        "Plan: {plan}\nDraft: {draft}\n\nRewrite the draft as the assistant's next message. \
         Keep its meaning and any quoted options, stay within two sentences, and output only \
         the message."
    );
    ChatRequest {
        model: settings.stage.model.clone(),
        messages: vec![
            Message::system(settings.system_prompt),
            Message::user(user),
        ],
        max_tokens: settings.stage.max_tokens,
        temperature: settings.stage.temperature,
        ..Default::default()
    }
}

/// Render a directive into the user-facing utterance.
///
/// Never fails: backend errors and guard violations are absorbed and
/// reported in the returned [`RenderOutcome`].
pub async fn render(
    directive: &StrategyDirective,
    backend: &dyn Backend,
    settings: RenderSettings<'_>,
) -> RenderOutcome {
    let drafted = draft(directive);
    if settings.mode == RenderMode::TemplateOnly {
        return RenderOutcome {
            utterance: drafted,
            backend_error: None,
            violation: None,
        };
    }

    let request = render_request(directive, &drafted.text, &settings);
    match complete_within(backend, request, settings.timeout).await {
        Ok(raw) => {
            let text = guard::clean(&raw);
            match guard::check(&text, &directive.target) {
                Ok(()) => RenderOutcome {
                    utterance: RenderedUtterance {
                        text,
                        origin: UtteranceOrigin::Model,
                    },
                    backend_error: None,
                    violation: None,
                },
                Err(violation) => {
                    warn!("Discarding rendered text: {violation}");
                    RenderOutcome {
                        utterance: drafted,
                        backend_error: None,
                        violation: Some(violation),
                    }
                }
            }
        }
        Err(err) => {
            warn!("Render backend failed, using frames-only question: {err}");
            RenderOutcome {
                utterance: frames_only(directive),
                backend_error: Some(err),
                violation: None,
            }
        }
    }
}
