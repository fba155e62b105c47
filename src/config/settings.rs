//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section carries
//! `#[serde(default)]`, which lets a partial `settings.toml` load with the
//! remaining values at their defaults.
//!
//! Once a job starts, the configuration is shared as an `Arc<AppConfig>` and
//! never mutated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::voice::VoiceCategory;

/// Environment variable that overrides `synthesis.cloud.api_token`.
pub const CLOUD_TOKEN_ENV: &str = "NARRATOR_CLOUD_TOKEN";
/// Environment variable that overrides `advisor.api_key`.
pub const ADVISOR_KEY_ENV: &str = "NARRATOR_ADVISOR_KEY";

// ---------------------------------------------------------------------------
// ProviderPreference
// ---------------------------------------------------------------------------

/// Which synthesis providers a job may use, and in which order.
///
/// | Variant | Order tried          |
/// |---------|----------------------|
/// | Auto    | cloud → local        |
/// | Cloud   | cloud only           |
/// | Local   | local only           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreference {
    #[default]
    Auto,
    Cloud,
    Local,
}

// ---------------------------------------------------------------------------
// SegmentationConfig
// ---------------------------------------------------------------------------

/// Settings for splitting text into voice-tagged segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Upper bound, in characters, for one segment.  A single sentence with
    /// no whitespace inside the bound may still exceed it.
    pub max_segment_chars: usize,
    /// How many leading characters of an unattributed span are inspected for
    /// an already-known speaker name.
    pub opening_window_chars: usize,
    /// Characters on each side of a name's first occurrence used to guess the
    /// gender of a newly discovered character.
    pub name_window_chars: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_segment_chars: 250,
            opening_window_chars: 50,
            name_window_chars: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// VoicesConfig
// ---------------------------------------------------------------------------

/// A user-supplied binding for one named character.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterVoice {
    /// Voice category the character falls back to when no explicit reference
    /// sample is given.  `None` keeps the heuristic guess.
    pub category: Option<VoiceCategory>,
    /// Explicit reference-voice sample for this character.
    pub reference: Option<PathBuf>,
}

/// Reference-voice samples for the built-in categories plus per-character
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub narrator: PathBuf,
    pub male: PathBuf,
    pub female: PathBuf,
    /// Character overrides keyed by name, merged with `voice-overrides.json`.
    pub characters: BTreeMap<String, CharacterVoice>,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        let dir = AppPaths::new().voices_dir;
        Self {
            narrator: dir.join("narrator.wav"),
            male: dir.join("male.wav"),
            female: dir.join("female.wav"),
            characters: BTreeMap::new(),
        }
    }
}

impl VoicesConfig {
    /// Reference sample for a built-in category.
    pub fn reference_for(&self, category: VoiceCategory) -> &Path {
        match category {
            VoiceCategory::Narrator => &self.narrator,
            VoiceCategory::Male => &self.male,
            VoiceCategory::Female => &self.female,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesisConfig
// ---------------------------------------------------------------------------

/// Remote synthesis service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub enabled: bool,
    /// Full URL that accepts a JSON synthesis request and answers with WAV
    /// bytes.
    pub endpoint: String,
    /// Bearer token.  Usually supplied through `NARRATOR_CLOUD_TOKEN`.
    pub api_token: Option<String>,
    /// Language code forwarded to the service.
    pub language: String,
    /// Maximum seconds for one synthesis request.
    pub timeout_secs: u64,
    /// Maximum number of in-flight requests.
    pub max_concurrency: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:8020/v1/synthesize".into(),
            api_token: None,
            language: "en".into(),
            timeout_secs: 300,
            max_concurrency: 3,
        }
    }
}

/// Local synthesis engine invoked as a subprocess.
///
/// Arguments may contain the placeholders `{text_file}`, `{voice}` (the
/// reference sample path), `{speed}`, `{tone}` and `{output}`, which are
/// substituted per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Optional command run after every call to free engine resources
    /// (e.g. accelerator memory held by a resident daemon).
    pub release_command: Option<Vec<String>>,
    /// Maximum seconds for one synthesis call.
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tts".into(),
            args: vec![
                "--text-file".into(),
                "{text_file}".into(),
                "--speaker-wav".into(),
                "{voice}".into(),
                "--speed".into(),
                "{speed}".into(),
                "--out-path".into(),
                "{output}".into(),
            ],
            release_command: None,
            timeout_secs: 300,
        }
    }
}

/// Settings for the synthesis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub provider: ProviderPreference,
    /// Number of segments dispatched concurrently.
    pub workers: usize,
    pub cloud: CloudConfig,
    pub local: LocalConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: ProviderPreference::default(),
            workers: 3,
            cloud: CloudConfig::default(),
            local: LocalConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Attempt budgets per stage and the shared backoff curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub extraction_attempts: u32,
    pub staging_attempts: u32,
    pub synthesis_attempts: u32,
    pub merge_attempts: u32,
    pub cleanup_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for any single backoff delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extraction_attempts: 1,
            staging_attempts: 1,
            synthesis_attempts: 3,
            merge_attempts: 1,
            cleanup_attempts: 1,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AdvisorConfig
// ---------------------------------------------------------------------------

/// Optional language-model refinement of paragraphs before voice
/// assignment.  Disabled by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Maximum seconds to wait for one answer.
    pub timeout_secs: u64,
    /// Attempts per paragraph before the original text is kept.
    pub max_attempts: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.2,
            timeout_secs: 30,
            max_attempts: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractionConfig
// ---------------------------------------------------------------------------

/// Settings for reading source documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Program used to pull text out of PDF files.
    pub pdftotext_command: String,
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdftotext_command: "pdftotext".into(),
            timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Formats the merge stage can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Wav,
    Mp3,
}

/// Settings for chunk validation, merging and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the merged narration in Hz.
    pub sample_rate: u32,
    /// Silence inserted between consecutive chunks.
    pub pause_ms: u32,
    /// Loudness target for RMS normalisation.
    pub target_dbfs: f32,
    /// Always contains `wav`; `mp3` additionally requires `ffmpeg`.
    pub export_formats: Vec<ExportFormat>,
    pub ffmpeg_command: String,
    /// Maximum seconds for the MP3 encoder.
    pub encode_timeout_secs: u64,
    /// Keep `voices/` after cleanup.
    pub keep_intermediates: bool,
    /// Chunks shorter than this are rejected as broken synthesis output.
    pub min_chunk_secs: f32,
    /// Chunks whose RMS falls below this are rejected as silent.
    pub silence_rms: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            pause_ms: 300,
            target_dbfs: -20.0,
            export_formats: vec![ExportFormat::Wav],
            ffmpeg_command: "ffmpeg".into(),
            encode_timeout_secs: 600,
            keep_intermediates: false,
            min_chunk_secs: 0.05,
            silence_rms: 1e-4,
        }
    }
}

impl AudioConfig {
    /// Reject values the merge stage cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_rate > 0, "audio.sample_rate must be positive");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use narrator::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory that holds one workspace per job.  `None` uses the
    /// platform data directory.
    pub jobs_dir: Option<PathBuf>,
    pub extraction: ExtractionConfig,
    pub segmentation: SegmentationConfig,
    pub voices: VoicesConfig,
    pub synthesis: SynthesisConfig,
    pub retry: RetryConfig,
    pub advisor: AdvisorConfig,
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field and range constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace secrets with values from the environment when present.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(CLOUD_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.synthesis.cloud.api_token = Some(token);
        }
        if let Some(key) = lookup(ADVISOR_KEY_ENV).filter(|k| !k.is_empty()) {
            self.advisor.api_key = Some(key);
        }
    }

    /// Directory that holds job workspaces.
    pub fn resolved_jobs_dir(&self) -> PathBuf {
        self.jobs_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().jobs_dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
