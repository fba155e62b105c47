//! Dialogue-attribution patterns.
//!
//! Three sentence shapes bind a quote to a speaker:
//!
//! | Shape        | Example                         |
//! |--------------|---------------------------------|
//! | quote-verb-N | `"Go," said Alice.`             |
//! | quote-N-verb | `"Go," Alice said.`             |
//! | N-verb-quote | `Alice said, "Go."`             |
//!
//! A pure quote followed by a sentence that opens with `Name verb`
//! (`"Where?" Bob asked.`) is handled by [`detect_tail`].

use std::sync::LazyLock;

use regex::Regex;

use super::segment::Tone;

const SPEECH_VERBS: &str = "said|says|asked|asks|replied|replies|answered|exclaimed|shouted|\
yelled|cried|called|whispered|murmured|muttered|snapped|added|continued|insisted|demanded|\
began|sighed|sobbed|laughed|remarked|growled";

const NAME: &str = r"[A-Z][a-z]+(?:-[A-Z][a-z]+)?";

/// Capitalised words that look like names but never are.
const STOPWORDS: &[&str] = &[
    "He", "She", "They", "It", "I", "We", "You", "The", "Then", "But", "And", "So", "A", "An",
    "This", "That", "His", "Her", "My", "Our", "Their", "Someone", "Somebody", "Everyone",
    "Nobody", "One", "There", "Here", "What", "When", "Where", "Why", "How", "Yes", "No", "Oh",
    "Well", "Now", "If", "As", "At", "In", "On", "Who",
];

fn compile(pattern: String) -> Regex {
    Regex::new(&pattern).expect("static regex must compile")
}

static QUOTE_VERB_NAME: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r#""[^"]+"\s*,?\s*(?P<verb>{SPEECH_VERBS})\s+(?P<name>{NAME})\b"#
    ))
});
static QUOTE_NAME_VERB: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r#""[^"]+"\s*,?\s*(?P<name>{NAME})\s+(?P<verb>{SPEECH_VERBS})\b"#
    ))
});
static NAME_VERB_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    compile(format!(
        r#"\b(?P<name>{NAME})\s+(?P<verb>{SPEECH_VERBS})\s*[,:]?\s*""#
    ))
});
static TAIL: LazyLock<Regex> =
    LazyLock::new(|| compile(format!(r"^(?P<name>{NAME})\s+(?P<verb>{SPEECH_VERBS})\b")));

/// A sentence bound to a named speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub name: String,
    pub tone: Tone,
}

/// Returns `true` for words that may be treated as a character name.
pub fn is_candidate_name(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase) && !STOPWORDS.contains(&word)
}

/// Prosody tone implied by a speech verb.
pub fn tone_for_verb(verb: &str) -> Tone {
    match verb {
        "shouted" | "yelled" | "exclaimed" | "cried" | "snapped" | "demanded" | "growled" => {
            Tone::Excited
        }
        "whispered" | "murmured" | "muttered" => Tone::Soft,
        "sighed" | "sobbed" => Tone::Sad,
        _ => Tone::Neutral,
    }
}

fn first_named(pattern: &Regex, sentence: &str) -> Option<Attribution> {
    pattern.captures_iter(sentence).find_map(|caps| {
        let name = caps.name("name")?.as_str();
        let verb = caps.name("verb")?.as_str();
        is_candidate_name(name).then(|| Attribution {
            name: name.to_string(),
            tone: tone_for_verb(verb),
        })
    })
}

/// Find a quote-with-attribution inside one sentence.
pub fn detect(sentence: &str) -> Option<Attribution> {
    [&*QUOTE_VERB_NAME, &*QUOTE_NAME_VERB, &*NAME_VERB_QUOTE]
        .into_iter()
        .find_map(|pattern| first_named(pattern, sentence))
}

/// Attribution carried by a sentence that opens with `Name verb`.
pub fn detect_tail(sentence: &str) -> Option<Attribution> {
    first_named(&TAIL, sentence)
}

/// A sentence consisting only of quoted speech.
pub fn is_pure_quote(sentence: &str) -> bool {
    let trimmed = sentence.trim();
    trimmed.len() >= 2
        && trimmed.starts_with('"')
        && trimmed.ends_with('"')
        && trimmed.matches('"').count() == 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(sentence: &str) -> Option<String> {
        detect(sentence).map(|a| a.name)
    }

    #[test]
    fn all_three_shapes_bind_a_name() {
        assert_eq!(named(r#""Go," said Alice."#).as_deref(), Some("Alice"));
        assert_eq!(named(r#""Go," Alice said."#).as_deref(), Some("Alice"));
        assert_eq!(named(r#"Alice said, "Go.""#).as_deref(), Some("Alice"));
        assert_eq!(named(r#"Mary-Jane replied: "Fine.""#).as_deref(), Some("Mary-Jane"));
    }

    #[test]
    fn pronouns_are_not_names() {
        assert_eq!(named(r#""Go," He said."#), None);
        assert_eq!(named(r#"She said, "Go.""#), None);
    }

    #[test]
    fn narration_without_quotes_is_unattributed() {
        assert_eq!(named("Alice said nothing at all."), None);
        assert_eq!(named("Bob frowned."), None);
    }

    #[test]
    fn verb_sets_tone() {
        let shouted = detect(r#""Run!" shouted Tom."#).unwrap();
        assert_eq!(shouted.tone, Tone::Excited);
        let whispered = detect(r#""Hush," Ann whispered."#).unwrap();
        assert_eq!(whispered.tone, Tone::Soft);
        let said = detect(r#""Hello," said Ann."#).unwrap();
        assert_eq!(said.tone, Tone::Neutral);
    }

    #[test]
    fn tail_sentence_names_speaker() {
        assert_eq!(detect_tail("Bob asked.").map(|a| a.name).as_deref(), Some("Bob"));
        assert_eq!(detect_tail("He asked."), None);
        assert_eq!(detect_tail("Later Bob asked."), None);
    }

    #[test]
    fn pure_quote_detection() {
        assert!(is_pure_quote(r#""Where are you?""#));
        assert!(!is_pure_quote(r#""Go," said Alice."#));
        assert!(!is_pure_quote("No quotes."));
        assert!(!is_pure_quote(r#"""#));
    }
}
