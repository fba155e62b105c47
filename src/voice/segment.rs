//! Voice-tagged segment types and the segments manifest.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VoiceCategory
// ---------------------------------------------------------------------------

/// Built-in reference-voice categories.  Every identity, including named
/// characters, is bound to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceCategory {
    Narrator,
    Male,
    Female,
}

impl VoiceCategory {
    /// Identity key used for segments that resolve to the category itself.
    pub fn key(self) -> &'static str {
        match self {
            Self::Narrator => "narrator",
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl std::fmt::Display for VoiceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Tone
// ---------------------------------------------------------------------------

/// Prosody hint derived from the attribution verb.  Opaque to the pipeline;
/// providers receive it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Excited,
    Soft,
    Sad,
}

impl Tone {
    /// Default speaking-rate multiplier for the tone.
    pub fn speed(self) -> f64 {
        match self {
            Self::Neutral => 1.0,
            Self::Excited => 1.1,
            Self::Soft | Self::Sad => 0.9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Excited => "excited",
            Self::Soft => "soft",
            Self::Sad => "sad",
        }
    }
}

fn default_speed() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// TextSegment
// ---------------------------------------------------------------------------

/// One speakable unit of narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    /// Position in the narration; also the audio chunk ordinal.
    pub index: usize,
    /// Never empty.
    pub text: String,
    /// Key into the manifest's voice table.
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub tone: Tone,
}

// ---------------------------------------------------------------------------
// VoiceIdentity
// ---------------------------------------------------------------------------

/// A resolved voice: the key segments refer to and the reference sample it
/// is synthesised with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceIdentity {
    pub key: String,
    pub category: VoiceCategory,
    pub reference: PathBuf,
}

// ---------------------------------------------------------------------------
// SegmentManifest
// ---------------------------------------------------------------------------

/// The staging stage's output artifact (`staged/segments.json`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub segments: Vec<TextSegment>,
    /// Every voice key referenced by `segments`.
    pub voices: BTreeMap<String, VoiceIdentity>,
}

impl SegmentManifest {
    /// Voice identity for a segment.  Falls back to the narrator entry so
    /// synthesis always has a reference sample.
    pub fn voice_for(&self, segment: &TextSegment) -> Option<&VoiceIdentity> {
        self.voices
            .get(&segment.voice)
            .or_else(|| self.voices.get(VoiceCategory::Narrator.key()))
    }

    /// Number of segments per voice key, for logging.
    pub fn voice_summary(&self) -> BTreeMap<&str, usize> {
        let mut summary = BTreeMap::new();
        for segment in &self.segments {
            *summary.entry(segment.voice.as_str()).or_insert(0) += 1;
        }
        summary
    }

    /// Structural problems that make the manifest unusable, if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.segments.is_empty() {
            return Err("manifest contains no segments".into());
        }
        for (position, segment) in self.segments.iter().enumerate() {
            if segment.index != position {
                return Err(format!(
                    "segment at position {position} has index {}",
                    segment.index
                ));
            }
            if segment.text.trim().is_empty() {
                return Err(format!("segment {} has empty text", segment.index));
            }
            if !self.voices.contains_key(&segment.voice) {
                return Err(format!(
                    "segment {} references unknown voice {:?}",
                    segment.index, segment.voice
                ));
            }
        }
        Ok(())
    }
}
