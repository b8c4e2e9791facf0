//! Lexical cues read from user messages.
//!
//! Used by the deterministic [`RuleClassifier`](crate::inference::rules::RuleClassifier)
//! and by reject tracking. Matching is lowercase substring matching on
//! word-padded text so `"no"` does not fire inside `"know"`.

use crate::catalog::Frame;

pub const REJECT_CUES: &[&str] = &[
    "don't like",
    "dont like",
    "do not like",
    "not a fan",
    "not into",
    "hate",
    "dislike",
    "rather not",
    "not really",
    "no way",
    "nope",
    "boring",
    "too dark",
    "not that",
    "something else",
];

pub const AGREEMENT_CUES: &[&str] = &[
    "yes",
    "yeah",
    "love",
    "sounds good",
    "sounds great",
    "perfect",
    "let's go with",
    "lets go with",
    "that one",
    "i'll take",
    "exactly",
];

pub const TAKEOVER_CUES: &[&str] = &[
    "i'll decide",
    "i will decide",
    "let me choose",
    "let me decide",
    "my own idea",
    "i already know",
    "i know what i want",
    "stop suggesting",
];

pub const COMPARISON_CUES: &[&str] = &["which", "between", "versus", "vs", "compare", "or"];

pub const OVERLOAD_CUES: &[&str] = &[
    "so many",
    "too many",
    "can't decide",
    "cant decide",
    "all of them",
    "overwhelming",
];

pub const UNIQUENESS_CUES: &[&str] = &[
    "unique",
    "memorable",
    "special",
    "unusual",
    "stand out",
    "one of a kind",
];

pub const VAGUE_CUES: &[&str] = &[
    "not sure",
    "don't know",
    "dont know",
    "no idea",
    "anything",
    "whatever",
    "no preference",
];

pub const DEADLOCK_CUES: &[&str] = &["stuck", "going in circles", "same thing again"];

/// Words that place a message inside the design conversation.
pub const DESIGN_VOCABULARY: &[&str] = &[
    "scene", "place", "places", "room", "space", "setting", "world", "feel", "vibe", "look",
    "design", "environment", "landscape", "building", "view", "color", "colour", "light",
    "style", "mood", "atmosphere", "quiet", "calm", "cozy", "forest", "city", "castle",
    "beach", "mountain", "village", "sky", "night", "day",
];

/// Per-frame trigger words, checked in [`Frame::ALL`] order.
pub fn frame_cues(frame: Frame) -> &'static [&'static str] {
    match frame {
        Frame::Mood => &[
            "quiet", "calm", "peaceful", "cozy", "eerie", "cheerful", "mood", "feel", "vibe",
            "serene",
        ],
        Frame::Lighting => &["light", "bright", "dim", "glow", "sunset", "shadow", "candle"],
        Frame::Palette => &["color", "colour", "red", "blue", "green", "gold", "tones", "pastel"],
        Frame::Style => &["style", "gothic", "modern", "rustic", "fantasy", "minimal"],
        Frame::EraRegion => &["ancient", "old", "era", "century", "medieval", "future", "region"],
        Frame::Weather => &["rain", "fog", "mist", "snow", "storm", "sunny", "weather"],
        Frame::Composition => &["view", "angle", "overlook", "perspective", "horizon"],
        Frame::Materials => &["stone", "wood", "metal", "glass", "brick", "marble"],
        Frame::ClutterDensity => &["busy", "crowded", "empty", "sparse", "cluttered", "open"],
        Frame::StoryCues => &["story", "legend", "history", "secret", "treasure", "ruins"],
    }
}

/// Lowercase `text` and pad punctuation with spaces so cue matching can use
/// word boundaries.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for c in text.chars() {
        if c.is_alphanumeric() || c == '\'' {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.push(' ');
    out
}

/// Whether the normalized text contains `cue` as a whole word or phrase.
pub fn has_cue(normalized: &str, cue: &str) -> bool {
    normalized.contains(&format!(" {cue} "))
}

pub fn has_any(normalized: &str, cues: &[&str]) -> bool {
    cues.iter().any(|c| has_cue(normalized, c))
}

/// Significant lowercase words of the target (four letters or more). A
/// target with no such word, like "Oz", is matched by all of its words.
pub fn target_tokens(target: &str) -> Vec<String> {
    let normalized = normalize(target);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let significant: Vec<String> = words
        .iter()
        .filter(|w| w.chars().count() >= 4)
        .map(|w| w.to_string())
        .collect();
    if significant.is_empty() {
        words.into_iter().map(str::to_string).collect()
    } else {
        significant
    }
}

/// Whether a message refers to the target by any significant word.
pub fn refers_to_target(normalized: &str, target: &str) -> bool {
    target_tokens(target).iter().any(|t| has_cue(normalized, t))
}

/// Frames mentioned in the text, in catalog order.
pub fn detect_frames(normalized: &str) -> Vec<Frame> {
    Frame::ALL
        .into_iter()
        .filter(|f| has_any(normalized, frame_cues(*f)))
        .collect()
}

/// Cue words the user actually used, for agency mirroring.
pub fn mirrored_words(normalized: &str, target: &str, limit: usize) -> Vec<String> {
    let tokens = target_tokens(target);
    let mut words = Vec::new();
    for frame in Frame::ALL {
        for cue in frame_cues(frame) {
            if words.len() >= limit {
                return words;
            }
            let cue = (*cue).to_string();
            if has_cue(normalized, &cue) && !tokens.contains(&cue) && !words.contains(&cue) {
                words.push(cue);
            }
        }
    }
    words
}
