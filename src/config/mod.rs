//! Configuration module for the narrator.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AdvisorConfig, AppConfig, AudioConfig, CharacterVoice, CloudConfig, ExportFormat,
    ExtractionConfig, LocalConfig, ProviderPreference, RetryConfig, SegmentationConfig,
    SynthesisConfig, VoicesConfig, ADVISOR_KEY_ENV, CLOUD_TOKEN_ENV,
};
