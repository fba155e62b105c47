//! Character-voice assignment.
//!
//! [`VoiceAssigner::assign`] turns cleaned text into an ordered list of
//! voice-tagged [`TextSegment`]s.  Heuristics are applied per paragraph in
//! priority order:
//!
//! ```text
//! paragraph ─▶ sentences ─▶ attribution scan ──match──▶ named character
//!                               │
//!                               └─ unattributed run ─▶ known name in opening?
//!                                                         ├─ yes ─▶ that character
//!                                                         └─ no ──▶ pronoun tally
//!                                                                    ├─ male / female
//!                                                                    └─ even ─▶ narrator
//! ```
//!
//! Every run of equally-bound sentences is then packed into segments within
//! the configured length bound.  Assignment never fails: absence of signal
//! always ends at the narrator voice.

use std::collections::BTreeSet;

use crate::config::{AppConfig, SegmentationConfig, VoicesConfig};

use super::attribution::{self, Attribution};
use super::gender::PronounTally;
use super::overrides::VoiceOverrides;
use super::registry::VoiceRegistry;
use super::segment::{SegmentManifest, TextSegment, Tone};
use super::sentence::{pack_sentences, split_paragraphs, split_sentences};

/// Deterministic text → segments assigner.
#[derive(Debug, Clone)]
pub struct VoiceAssigner {
    segmentation: SegmentationConfig,
    voices: VoicesConfig,
    overrides: VoiceOverrides,
}

impl VoiceAssigner {
    pub fn new(
        segmentation: SegmentationConfig,
        voices: VoicesConfig,
        overrides: VoiceOverrides,
    ) -> Self {
        Self {
            segmentation,
            voices,
            overrides,
        }
    }

    /// Build from application settings.  Inline `[voices.characters]`
    /// entries are layered on top of `file_overrides`.
    pub fn from_config(config: &AppConfig, file_overrides: VoiceOverrides) -> Self {
        let overrides = file_overrides.merged_with(&config.voices.characters);
        Self::new(config.segmentation.clone(), config.voices.clone(), overrides)
    }

    pub fn max_segment_chars(&self) -> usize {
        self.segmentation.max_segment_chars
    }

    /// Split `text` into voice-tagged segments.
    pub fn assign(&self, text: &str) -> SegmentManifest {
        let mut registry = VoiceRegistry::new(
            &self.voices,
            &self.overrides,
            self.segmentation.name_window_chars,
        );
        let mut segments: Vec<TextSegment> = Vec::new();

        for paragraph in split_paragraphs(text) {
            let sentences = split_sentences(&paragraph);
            let bindings = bind_sentences(&sentences);

            let mut start = 0;
            while start < sentences.len() {
                let mut end = start + 1;
                while end < sentences.len() && bindings[end] == bindings[start] {
                    end += 1;
                }
                let run = &sentences[start..end];

                let (voice, tone) = match &bindings[start] {
                    Some(found) => (registry.character(&found.name, text), found.tone),
                    None => (
                        self.resolve_unattributed(&run.join(" "), text, &mut registry),
                        Tone::Neutral,
                    ),
                };

                for chunk in pack_sentences(run, self.segmentation.max_segment_chars) {
                    segments.push(TextSegment {
                        index: segments.len(),
                        text: chunk,
                        voice: voice.clone(),
                        speed: tone.speed(),
                        tone,
                    });
                }
                start = end;
            }
        }

        let used: BTreeSet<&str> = segments.iter().map(|s| s.voice.as_str()).collect();
        let voices = registry.into_voices(used);
        SegmentManifest { segments, voices }
    }

    fn resolve_unattributed(
        &self,
        span: &str,
        document: &str,
        registry: &mut VoiceRegistry<'_>,
    ) -> String {
        if let Some(name) = registry.known_in_opening(span, self.segmentation.opening_window_chars)
        {
            return registry.character(&name, document);
        }
        registry.category(PronounTally::of(span).category())
    }
}

/// Attribution for each sentence of one paragraph.
///
/// Besides direct matches, a pure quote takes the speaker of a following
/// `Name verb` sentence, or else continues the speaker of the sentence
/// before it.
fn bind_sentences(sentences: &[String]) -> Vec<Option<Attribution>> {
    let mut bindings: Vec<Option<Attribution>> = vec![None; sentences.len()];

    for i in 0..sentences.len() {
        if bindings[i].is_some() {
            continue;
        }
        if let Some(found) = attribution::detect(&sentences[i]) {
            bindings[i] = Some(found);
            continue;
        }
        if !attribution::is_pure_quote(&sentences[i]) {
            continue;
        }
        if let Some(tail) = sentences.get(i + 1).and_then(|s| attribution::detect_tail(s)) {
            bindings[i] = Some(tail.clone());
            bindings[i + 1] = Some(tail);
        } else if let Some(previous) = i.checked_sub(1).and_then(|p| bindings[p].clone()) {
            bindings[i] = Some(Attribution {
                name: previous.name,
                tone: Tone::Neutral,
            });
        }
    }
    bindings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
