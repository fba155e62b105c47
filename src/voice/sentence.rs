//! Paragraph and sentence splitting plus greedy segment packing.
//!
//! All lengths are measured in characters, not bytes.

use std::sync::LazyLock;

use regex::Regex;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("static regex must compile"));

/// Words whose trailing period never ends a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "st", "jr", "sr", "prof", "mt", "vs", "etc", "capt", "col", "gen",
    "lt", "sgt", "rev",
];

/// Split text into paragraphs on blank lines.  Whitespace inside each
/// paragraph is collapsed to single spaces.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_BREAK
        .split(text)
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']')
}

fn opens_sentence(c: char) -> bool {
    c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '(' | '[')
}

fn ends_with_abbreviation(before: &str) -> bool {
    let reversed: Vec<char> = before.chars().rev().take_while(|c| c.is_alphabetic()).collect();
    if reversed.len() == 1 && reversed[0].is_uppercase() {
        return true;
    }
    let word: String = reversed.into_iter().rev().collect::<String>().to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

/// Split a whitespace-normalised paragraph into sentences.
///
/// A boundary is a run of `.`, `!` or `?`, optionally followed by closing
/// quotes or brackets, then a space and a character that can open a
/// sentence.  A terminator inside an open double quote only ends the
/// sentence when the quote closes right after it, so `"Stop. Now," she said.`
/// stays whole.  Abbreviations such as `Mr.` and single initials never end a
/// sentence.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut in_quote = false;
    let mut i = 0usize;

    while i < chars.len() {
        let (byte, c) = chars[i];
        if c == '"' {
            in_quote = !in_quote;
            i += 1;
            continue;
        }
        if !is_terminator(c) {
            i += 1;
            continue;
        }

        let mut j = i;
        while j + 1 < chars.len() && is_terminator(chars[j + 1].1) {
            j += 1;
        }
        let mut quote_after = in_quote;
        while j + 1 < chars.len() && is_closer(chars[j + 1].1) {
            if chars[j + 1].1 == '"' {
                quote_after = !quote_after;
            }
            j += 1;
        }

        let abbreviation = c == '.' && j == i && ends_with_abbreviation(&paragraph[start..byte]);
        let boundary = !quote_after && !abbreviation;
        let followed_by_opener = j + 2 < chars.len()
            && chars[j + 1].1 == ' '
            && opens_sentence(chars[j + 2].1);

        in_quote = quote_after;
        if boundary && followed_by_opener {
            let end = chars[j + 1].0;
            let sentence = paragraph[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }
        i = j + 1;
    }

    let rest = paragraph[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Split one over-long sentence at the last space that keeps each piece
/// within `max_chars`.  When no space exists inside the bound the remainder
/// is emitted whole.
pub fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();

    while rest.chars().count() > max_chars {
        let cut = rest
            .char_indices()
            .take(max_chars + 1)
            .skip(1)
            .filter(|(_, c)| c.is_whitespace())
            .map(|(i, _)| i)
            .last();
        match cut {
            Some(at) => {
                pieces.push(rest[..at].trim_end().to_string());
                rest = rest[at..].trim_start();
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Greedily pack sentences into chunks of at most `max_chars`, joining with
/// a single space.  Sentences longer than the bound are hard-split and never
/// share a chunk with their neighbours.
pub fn pack_sentences(sentences: &[String], max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in sentences {
        let len = sentence.chars().count();
        if len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            chunks.extend(hard_split(sentence, max_chars));
            continue;
        }
        if current.is_empty() {
            current.push_str(sentence);
            current_len = len;
        } else if current_len + 1 + len <= max_chars {
            current.push(' ');
            current.push_str(sentence);
            current_len += 1 + len;
        } else {
            chunks.push(std::mem::replace(&mut current, sentence.clone()));
            current_len = len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let paragraphs = split_paragraphs("One line\ncontinues.\n\n  \nTwo.\n\nThree.");
        assert_eq!(paragraphs, owned(&["One line continues.", "Two.", "Three."]));
    }

    #[test]
    fn sentences_split_after_closing_quote() {
        let sentences = split_sentences(r#"Alice said, "I am leaving." Bob frowned."#);
        assert_eq!(sentences, owned(&[r#"Alice said, "I am leaving.""#, "Bob frowned."]));
    }

    #[test]
    fn lowercase_continuation_is_not_a_boundary() {
        let sentences = split_sentences(r#""Stop!" he cried. Then silence."#);
        assert_eq!(sentences, owned(&[r#""Stop!" he cried."#, "Then silence."]));
    }

    #[test]
    fn terminator_inside_open_quote_keeps_sentence_whole() {
        let sentences = split_sentences(r#""Stop. Now," she said. It worked."#);
        assert_eq!(sentences, owned(&[r#""Stop. Now," she said."#, "It worked."]));
    }

    #[test]
    fn abbreviations_and_initials_do_not_split() {
        let sentences = split_sentences("Mr. Smith met J. Doe. They talked.");
        assert_eq!(sentences, owned(&["Mr. Smith met J. Doe.", "They talked."]));
    }

    #[test]
    fn ellipsis_and_mixed_terminators() {
        let sentences = split_sentences("Wait... What?! Go.");
        assert_eq!(sentences, owned(&["Wait...", "What?!", "Go."]));
    }

    #[test]
    fn hard_split_uses_last_space_within_bound() {
        let pieces = hard_split("aaaa bbbb cccc dddd", 10);
        assert_eq!(pieces, owned(&["aaaa bbbb", "cccc dddd"]));
        assert!(pieces.iter().all(|p| p.chars().count() <= 10));
    }

    #[test]
    fn hard_split_without_space_keeps_sentence_whole() {
        let sentence = format!("A{}.", "a".repeat(118));
        assert_eq!(sentence.chars().count(), 120);
        assert_eq!(hard_split(&sentence, 50), vec![sentence.clone()]);
    }

    #[test]
    fn hard_split_counts_characters_not_bytes() {
        let pieces = hard_split("ééééé ééééé", 5);
        assert_eq!(pieces, owned(&["ééééé", "ééééé"]));
    }

    #[test]
    fn packing_is_greedy_and_bounded() {
        let sentences = owned(&["One two.", "Three four.", "Five.", "Six seven eight."]);
        let chunks = pack_sentences(&sentences, 20);
        assert_eq!(chunks, owned(&["One two. Three four.", "Five.", "Six seven eight."]));
    }

    #[test]
    fn long_sentence_is_isolated_and_split() {
        let sentences = owned(&["Short.", "this sentence is far too long", "End."]);
        let chunks = pack_sentences(&sentences, 12);
        assert_eq!(
            chunks,
            owned(&["Short.", "this", "sentence is", "far too long", "End."])
        );
    }
}
