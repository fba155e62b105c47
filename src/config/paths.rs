//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + voice overrides):
//!   Windows: %APPDATA%\narrator\
//!   macOS:   ~/Library/Application Support/narrator/
//!   Linux:   ~/.config/narrator/
//!
//! Data dir (reference voices, job workspaces):
//!   Windows: %LOCALAPPDATA%\narrator\
//!   macOS:   ~/Library/Application Support/narrator/
//!   Linux:   ~/.local/share/narrator/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and `voice-overrides.json`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to `voice-overrides.json`.
    pub voice_overrides_file: PathBuf,
    /// Directory holding the built-in reference-voice samples.
    pub voices_dir: PathBuf,
    /// Default parent directory of job workspaces.
    pub jobs_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "narrator";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            voice_overrides_file: config_dir.join("voice-overrides.json"),
            config_dir,
            voices_dir: data_dir.join("voices"),
            jobs_dir: data_dir.join("jobs"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
