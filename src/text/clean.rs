//! Deterministic text normalisation applied before voice assignment.
//!
//! [`clean_text`] repairs extraction artifacts (ligatures, typographic
//! quotes, line-break hyphenation, page numbers, separator rules) and drops
//! front/back-matter boilerplate through [`filter_unwanted_content`].
//!
//! Cleaning is idempotent: `clean_text(&clean_text(x)) == clean_text(x)`.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| compile(r"[ \t\u{a0}]+"));
static LINE_EDGE_SPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^ +| +$"));
static HYPHEN_BREAK: LazyLock<Regex> = LazyLock::new(|| compile(r"([a-z])-\n([a-z])"));
static PAGE_NUMBER_LINE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?im)^(?:page )?\d{1,4}(?:\n|\z)"));
static SEPARATOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^(?:-{3,}|\*{3,}|={3,}|~{3,}|_{3,}|(?:\* ){2,}\*)(?:\n|\z)")
});
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| compile(r"\n{3,}"));

static COPYRIGHT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?s)Copyright © \d{4}.*?(\n\n[A-Z]|\z)"));
static ACKNOWLEDGMENTS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?is)A C K N O W L E D G M E N T S.*"));
static PRODUCTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"INT_\d+\.indd.*?\d{1,2}/\d{1,2}/\d{2,4}.*?[AP]M"));
static READER_NOTE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)FOR MY READERS.*?\n"));

/// Character substitutions for ligatures and typographic punctuation.
const CHAR_MAP: &[(char, &str)] = &[
    ('\u{fb00}', "ff"),
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{201e}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2026}', "..."),
];

// ---------------------------------------------------------------------------
// Boilerplate filtering
// ---------------------------------------------------------------------------

/// A category of boilerplate removed by [`filter_unwanted_content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovedSection {
    CopyrightNotice,
    Acknowledgments,
    PageMarkers,
    ReaderNotes,
}

/// Result of [`filter_unwanted_content`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub text: String,
    pub removed: Vec<RemovedSection>,
}

/// Remove copyright blocks, acknowledgment trailers, typesetting markers and
/// reader notes.
pub fn filter_unwanted_content(text: &str) -> FilterOutcome {
    let mut removed = Vec::new();
    let mut filtered = text.to_string();

    let passes: [(&Regex, &str, RemovedSection); 4] = [
        (&*COPYRIGHT_BLOCK, "${1}", RemovedSection::CopyrightNotice),
        (&*ACKNOWLEDGMENTS, "", RemovedSection::Acknowledgments),
        (&*PRODUCTION_MARKER, "", RemovedSection::PageMarkers),
        (&*READER_NOTE, "", RemovedSection::ReaderNotes),
    ];
    for (pattern, replacement, section) in passes {
        if pattern.is_match(&filtered) {
            filtered = pattern.replace_all(&filtered, replacement).into_owned();
            removed.push(section);
        }
    }

    FilterOutcome {
        text: filtered,
        removed,
    }
}

// ---------------------------------------------------------------------------
// clean_text
// ---------------------------------------------------------------------------

/// Normalise raw extracted text into narration-ready prose.
///
/// Paragraphs are separated by exactly one blank line in the output; lines
/// carry no leading or trailing spaces.  Line removals can bring the halves
/// of a hyphenated word together, so the line pass repeats until the text
/// stops changing.
pub fn clean_text(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n").replace('\r', "\n");

    if text.chars().any(|c| CHAR_MAP.iter().any(|(from, _)| *from == c)) {
        let mut mapped = String::with_capacity(text.len());
        for c in text.chars() {
            match CHAR_MAP.iter().find(|(from, _)| *from == c) {
                Some((_, to)) => mapped.push_str(to),
                None => mapped.push(c),
            }
        }
        text = mapped;
    }

    loop {
        let next = clean_lines(&text);
        if next == text {
            return next;
        }
        text = next;
    }
}

/// One pass of whitespace, boilerplate and line-level repairs.
fn clean_lines(text: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(text, " ");
    let text = LINE_EDGE_SPACE.replace_all(&text, "");

    let filtered = filter_unwanted_content(&text);
    if !filtered.removed.is_empty() {
        log::debug!("clean: removed sections {:?}", filtered.removed);
    }

    let text = PAGE_NUMBER_LINE.replace_all(&filtered.text, "");
    let text = SEPARATOR_LINE.replace_all(&text, "");
    let text = HYPHEN_BREAK.replace_all(&text, "${1}${2}");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_ligatures_and_typographic_quotes() {
        let cleaned = clean_text("The \u{fb01}rst \u{201c}o\u{fb03}ce\u{201d} \u{2014} it\u{2019}s here");
        assert_eq!(cleaned, "The first \"office\" - it's here");
    }

    #[test]
    fn joins_line_break_hyphenation() {
        assert_eq!(clean_text("an extra-\nordinary day"), "an extraordinary day");
    }

    #[test]
    fn keeps_hyphen_before_capital() {
        assert_eq!(clean_text("Jean-\nPaul"), "Jean-\nPaul");
    }

    #[test]
    fn collapses_whitespace_and_blank_lines() {
        let cleaned = clean_text("  One\t\t two  \n\n\n\n  Three  \r\n");
        assert_eq!(cleaned, "One two\n\nThree");
    }

    #[test]
    fn removes_page_numbers_and_separators() {
        let cleaned = clean_text("First line.\n12\nPage 13\n***\nSecond line.\n-----");
        assert_eq!(cleaned, "First line.\nSecond line.");
    }

    #[test]
    fn filters_copyright_block() {
        let outcome = filter_unwanted_content(
            "Copyright © 2024 Author. All rights reserved.\nISBN 123\n\nActual content here.",
        );
        assert_eq!(outcome.text, "\n\nActual content here.");
        assert_eq!(outcome.removed, vec![RemovedSection::CopyrightNotice]);
    }

    #[test]
    fn filters_acknowledgments_to_end() {
        let outcome = filter_unwanted_content("The end.\n\nA C K N O W L E D G M E N T S\nThanks all.");
        assert_eq!(outcome.text, "The end.\n\n");
        assert!(outcome.removed.contains(&RemovedSection::Acknowledgments));
    }

    #[test]
    fn filters_reader_notes() {
        let outcome = filter_unwanted_content("For my readers: sign up!\nStory starts.");
        assert_eq!(outcome.text, "Story starts.");
        assert_eq!(outcome.removed, vec![RemovedSection::ReaderNotes]);
    }

    #[test]
    fn nothing_removed_from_plain_prose() {
        let outcome = filter_unwanted_content("Just a story.");
        assert_eq!(outcome.text, "Just a story.");
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn joins_hyphenation_split_by_page_number() {
        let once = clean_text("an extra-\n12\nordinary day");
        assert_eq!(once, "an extraordinary day");
        assert_eq!(clean_text(&once), once);
    }

    #[test]
    fn joins_hyphenation_split_by_separator_and_page_marker() {
        let once = clean_text("a remark-\n***\nable trip and a long-\nPage 40\nawaited end");
        assert_eq!(once, "a remarkable trip and a longawaited end");
        assert_eq!(clean_text(&once), once);
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw = "Copyright © 2020 X.\n\nChapter \u{fb01}ve\n\n\n\n\u{201c}Hi,\u{201d} said Ann-\nie.  \n7\nShe  left.\n===\n";
        let once = clean_text(raw);
        assert_eq!(clean_text(&once), once);
    }
}
