//! Output checks applied to every utterance before it leaves the renderer.

use crate::cues;
use crate::directive::mentions;
use thiserror::Error;

/// Maximum sentences in one utterance.
pub const MAX_SENTENCES: usize = 2;

/// Words that would expose the pipeline's internals to the user.
pub const FORBIDDEN_WORDS: &[&str] = &[
    "strategy",
    "strategies",
    "json",
    "internal",
    "directive",
    "hidden target",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("utterance is empty")]
    Empty,
    #[error("utterance contains the hidden target")]
    TargetLeak,
    #[error("utterance has {0} sentences")]
    TooManySentences(usize),
    #[error("utterance contains an emoji")]
    Emoji,
    #[error("utterance mentions '{0}'")]
    ForbiddenWord(&'static str),
}

/// Check `text` against every output constraint. A blank `target` skips the
/// leak check.
pub fn check(text: &str, target: &str) -> Result<(), Violation> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Violation::Empty);
    }
    if mentions(text, target) {
        return Err(Violation::TargetLeak);
    }
    let sentences = count_sentences(text);
    if sentences > MAX_SENTENCES {
        return Err(Violation::TooManySentences(sentences));
    }
    if text.chars().any(is_emoji) {
        return Err(Violation::Emoji);
    }
    let normalized = cues::normalize(text);
    if let Some(word) = FORBIDDEN_WORDS.iter().copied().find(|w| cues::has_cue(&normalized, w)) {
        return Err(Violation::ForbiddenWord(word));
    }
    Ok(())
}

/// Count sentences. A run of terminators closes a sentence only at the end
/// of the text or before whitespace and a word that does not start in
/// lowercase, so "3.5 m", "e.g. a tower" and "more... really" stay inside
/// one sentence. Closing quotes after a terminator belong to its run. Only
/// letters and digits open a sentence.
pub fn count_sentences(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    let mut open = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if is_terminator(c) {
            let mut end = i;
            while end < chars.len() && (is_terminator(chars[end]) || is_closer(chars[end])) {
                end += 1;
            }
            if open && closes_sentence(&chars[end..]) {
                count += 1;
                open = false;
            }
            i = end;
            continue;
        }
        if c.is_alphanumeric() {
            open = true;
        }
        i += 1;
    }
    count + usize::from(open)
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | '\u{201D}' | '\u{2019}')
}

fn closes_sentence(rest: &[char]) -> bool {
    match rest.first() {
        None => true,
        Some(c) if c.is_whitespace() => rest
            .iter()
            .find(|c| !c.is_whitespace())
            .is_none_or(|c| !c.is_lowercase()),
        Some(_) => false,
    }
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B50..=0x2B55 | 0xFE0F | 0x200D
    )
}

/// Trim model output: surrounding whitespace, wrapping quotes, and
/// internal line breaks.
pub fn clean(text: &str) -> String {
    let mut t = text.trim();
    for (open, close) in [('"', '"'), ('\u{201C}', '\u{201D}'), ('\'', '\'')] {
        if let Some(inner) = t.strip_prefix(open).and_then(|s| s.strip_suffix(close)) {
            t = inner.trim();
            break;
        }
    }
    t.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "Medieval Castle";

    #[test]
    fn accepts_two_clean_sentences() {
        assert_eq!(
            check("That sounds lovely. What kind of lighting do you picture?", TARGET),
            Ok(())
        );
    }

    #[test]
    fn leak_check_is_case_insensitive() {
        assert_eq!(
            check("How about a medieval CASTLE?", TARGET),
            Err(Violation::TargetLeak)
        );
        assert_eq!(check("How about a castle?", ""), Ok(()));
    }

    #[test]
    fn rejects_extra_sentences_emoji_and_internals() {
        assert_eq!(
            check("One. Two. Three?", TARGET),
            Err(Violation::TooManySentences(3))
        );
        assert_eq!(check("Lovely choice \u{1F3F0}!", TARGET), Err(Violation::Emoji));
        assert_eq!(
            check("My strategy is simple. Pick one?", TARGET),
            Err(Violation::ForbiddenWord("strategy"))
        );
    }

    #[test]
    fn sentence_count_ignores_quotes_and_ellipses() {
        assert_eq!(count_sentences("Both \"Misty Forest.\" And more... Really?"), 3);
        assert_eq!(count_sentences("Hmm... what do you think?"), 1);
        assert_eq!(count_sentences("Hmm... What do you think?"), 2);
        assert_eq!(count_sentences("No terminator at all"), 1);
        assert_eq!(count_sentences(""), 0);
    }

    #[test]
    fn decimals_and_abbreviations_do_not_split_sentences() {
        assert_eq!(count_sentences("A 3.5 m arch, e.g. a stone one. Which feels right?"), 2);
        assert_eq!(count_sentences("It spans 2.75m."), 1);
        assert_eq!(
            check("Picture a 3.5 m gate, e.g. oak or iron. Which draws you in?", TARGET),
            Ok(())
        );
    }

    #[test]
    fn clean_strips_wrapping_quotes_and_newlines() {
        assert_eq!(clean("  \"Hello there.\nWhat next?\"  "), "Hello there. What next?");
        assert_eq!(clean("plain"), "plain");
    }
}
