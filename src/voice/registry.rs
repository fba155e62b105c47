//! Voice identities discovered while assigning one document.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::VoicesConfig;

use super::gender::{window_around, PronounTally};
use super::overrides::VoiceOverrides;
use super::segment::{VoiceCategory, VoiceIdentity};

/// Maps voice keys to identities.  Built-in categories resolve to their own
/// reference sample; characters resolve to an override or to the category
/// guessed from pronouns around their first appearance.
pub struct VoiceRegistry<'a> {
    voices: &'a VoicesConfig,
    overrides: &'a VoiceOverrides,
    name_window_chars: usize,
    identities: BTreeMap<String, VoiceIdentity>,
}

impl<'a> VoiceRegistry<'a> {
    pub fn new(
        voices: &'a VoicesConfig,
        overrides: &'a VoiceOverrides,
        name_window_chars: usize,
    ) -> Self {
        let mut registry = Self {
            voices,
            overrides,
            name_window_chars,
            identities: BTreeMap::new(),
        };
        registry.category(VoiceCategory::Narrator);
        registry
    }

    /// Key for a built-in category, registering it on first use.
    pub fn category(&mut self, category: VoiceCategory) -> String {
        let key = category.key().to_string();
        if !self.identities.contains_key(&key) {
            let reference = self.voices.reference_for(category).to_path_buf();
            self.identities.insert(
                key.clone(),
                VoiceIdentity {
                    key: key.clone(),
                    category,
                    reference,
                },
            );
        }
        key
    }

    /// Key for a named character, registering it on first use.  `document` is
    /// the full text, used to score the name's surroundings.
    pub fn character(&mut self, name: &str, document: &str) -> String {
        if self.identities.contains_key(name) {
            return name.to_string();
        }
        let configured = self.overrides.get(name);
        let category = configured
            .and_then(|v| v.category)
            .unwrap_or_else(|| self.guess_category(name, document));
        let reference = configured
            .and_then(|v| v.reference.clone())
            .unwrap_or_else(|| self.voices.reference_for(category).to_path_buf());

        log::debug!("staging: new voice {name:?} ({category})");
        self.identities.insert(
            name.to_string(),
            VoiceIdentity {
                key: name.to_string(),
                category,
                reference,
            },
        );
        name.to_string()
    }

    fn guess_category(&self, name: &str, document: &str) -> VoiceCategory {
        let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
            return VoiceCategory::Narrator;
        };
        match pattern.find(document) {
            Some(m) => {
                let window = window_around(document, m.start(), m.end(), self.name_window_chars);
                PronounTally::of(window).category()
            }
            None => VoiceCategory::Narrator,
        }
    }

    /// Returns `true` for a name that is registered or listed in the
    /// override table.
    pub fn is_known_character(&self, name: &str) -> bool {
        let builtin = [VoiceCategory::Narrator, VoiceCategory::Male, VoiceCategory::Female]
            .iter()
            .any(|c| c.key() == name);
        !builtin && (self.identities.contains_key(name) || self.overrides.get(name).is_some())
    }

    /// First known character named within the first `window` characters of
    /// `span`.
    pub fn known_in_opening(&self, span: &str, window: usize) -> Option<String> {
        let end = span
            .char_indices()
            .nth(window)
            .map(|(i, _)| i)
            .unwrap_or(span.len());
        span[..end]
            .split(|c: char| !(c.is_alphabetic() || c == '-'))
            .find(|word| !word.is_empty() && self.is_known_character(word))
            .map(str::to_string)
    }

    /// Consume the registry, keeping only identities in `used`.  The narrator
    /// entry is always kept.
    pub fn into_voices<'k>(
        mut self,
        used: impl IntoIterator<Item = &'k str>,
    ) -> BTreeMap<String, VoiceIdentity> {
        let mut kept = BTreeMap::new();
        for key in used.into_iter().chain([VoiceCategory::Narrator.key()]) {
            if let Some(identity) = self.identities.remove(key) {
                kept.insert(key.to_string(), identity);
            }
        }
        kept
    }
}
