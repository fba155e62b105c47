//! User-supplied voice override table.
//!
//! [`VoiceOverrides`] persists `name -> CharacterVoice` bindings as JSON in
//! the platform config directory (`voice-overrides.json`).  Entries from
//! `settings.toml` (`[voices.characters]`) are layered on top of the file.
//! Overrides always win over heuristic assignment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{AppPaths, CharacterVoice};

use super::segment::VoiceCategory;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceOverrides {
    #[serde(default)]
    pub characters: BTreeMap<String, CharacterVoice>,
}

impl VoiceOverrides {
    /// Load from the platform config directory, or an empty table when the
    /// file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().voice_overrides_file)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let overrides = serde_json::from_str(&data)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(overrides)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Bind `name` to a category and/or explicit reference sample.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        category: Option<VoiceCategory>,
        reference: Option<PathBuf>,
    ) {
        self.characters
            .insert(name.into(), CharacterVoice { category, reference });
    }

    /// Layer `other` on top of `self`; entries in `other` replace ours.
    pub fn merged_with(mut self, other: &BTreeMap<String, CharacterVoice>) -> Self {
        for (name, voice) in other {
            self.characters.insert(name.clone(), voice.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&CharacterVoice> {
        self.characters.get(name)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }
}
