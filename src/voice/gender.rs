//! Pronoun-based gender scoring.
//!
//! [`PronounTally`] counts male- and female-coded pronouns in a text window.
//! An exactly even tally (including zero/zero) leans to the narrator.  This
//! is a heuristic; balanced or pronoun-free passages carry no signal.

use super::segment::VoiceCategory;

const MALE: &[&str] = &["he", "him", "his", "himself"];
const FEMALE: &[&str] = &["she", "her", "hers", "herself"];

/// Pronoun counts for one window of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PronounTally {
    pub male: usize,
    pub female: usize,
}

impl PronounTally {
    pub fn of(text: &str) -> Self {
        let mut tally = Self::default();
        for word in text.split(|c: char| !c.is_alphabetic()) {
            if word.is_empty() || word.len() > 7 {
                continue;
            }
            let lower = word.to_lowercase();
            if MALE.contains(&lower.as_str()) {
                tally.male += 1;
            } else if FEMALE.contains(&lower.as_str()) {
                tally.female += 1;
            }
        }
        tally
    }

    /// Category implied by the tally.
    pub fn category(self) -> VoiceCategory {
        use std::cmp::Ordering;
        match self.male.cmp(&self.female) {
            Ordering::Greater => VoiceCategory::Male,
            Ordering::Less => VoiceCategory::Female,
            Ordering::Equal => VoiceCategory::Narrator,
        }
    }
}

/// Slice `radius` characters on either side of `text[start..end]`.
pub fn window_around(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let lo = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let hi = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[lo..hi]
}
