//! Quality validation for synthesised chunks.
//!
//! [`AudioQuality`] checks an [`AudioChunk`] before it is accepted from a
//! speech provider:
//!
//! | Check | Description |
//! |-------|-------------|
//! | Duration | Chunk must last at least `min_secs` |
//! | Silence | RMS level must reach `silence_rms` |
//! | Clipping | Fewer than `clipping_max_pct`% of samples may be clipped |
//!
//! A failing chunk is treated by the gateway as a recoverable provider error,
//! so the next provider gets a chance.
//!
//! # Example
//!
//! ```rust
//! use narrator::audio::{AudioChunk, AudioError, AudioQuality};
//!
//! let validator = AudioQuality::new(0.05, 1e-4);
//!
//! let ok = AudioChunk::new(0, vec![0.1_f32; 2_400], 24_000);
//! assert!(validator.validate(&ok).is_ok());
//!
//! let short = AudioChunk::new(1, vec![0.1_f32; 100], 24_000);
//! assert!(matches!(validator.validate(&short), Err(AudioError::TooShort { .. })));
//! ```

use thiserror::Error;

use crate::audio::chunk::AudioChunk;
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// AudioError
// ---------------------------------------------------------------------------

/// Reason a chunk failed quality validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// The buffer holds no samples or has no sample rate.
    #[error("chunk {index} is empty")]
    Empty { index: usize },

    /// Chunk is shorter than the configured minimum.
    #[error("chunk too short: {got_secs:.3}s (minimum {min_secs:.3}s)")]
    TooShort { min_secs: f32, got_secs: f32 },

    /// RMS level is below the silence floor.
    #[error("chunk is silent: rms {rms:.6} (threshold {threshold:.6})")]
    Silent { rms: f32, threshold: f32 },

    /// Too many samples are clipped (at full scale).
    #[error("chunk clipping: {clipped_pct:.1}% of samples clipped (max {max_pct:.1}%)")]
    Clipping { clipped_pct: f32, max_pct: f32 },
}

// ---------------------------------------------------------------------------
// AudioQuality
// ---------------------------------------------------------------------------

/// Validates synthesised audio.
#[derive(Debug, Clone)]
pub struct AudioQuality {
    /// Minimum allowed duration in seconds (default: `0.05`).
    pub min_secs: f32,
    /// Minimum RMS level for the chunk to count as speech (default: `1e-4`).
    pub silence_rms: f32,
    /// Amplitude above which a sample is considered clipped (default: `0.999`).
    pub clipping_threshold: f32,
    /// Maximum percentage of clipped samples (default: `25.0`).
    pub clipping_max_pct: f32,
}

impl Default for AudioQuality {
    fn default() -> Self {
        Self {
            min_secs: 0.05,
            silence_rms: 1e-4,
            clipping_threshold: 0.999,
            clipping_max_pct: 25.0,
        }
    }
}

impl AudioQuality {
    /// Create a validator with the given duration and silence limits.
    pub fn new(min_secs: f32, silence_rms: f32) -> Self {
        Self {
            min_secs,
            silence_rms,
            ..Default::default()
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.min_chunk_secs, config.silence_rms)
    }

    /// Validate `chunk`.  Checks run in order: empty, duration, silence,
    /// clipping; the first failure is returned.
    pub fn validate(&self, chunk: &AudioChunk) -> Result<(), AudioError> {
        if chunk.is_empty() || chunk.sample_rate == 0 {
            return Err(AudioError::Empty { index: chunk.index });
        }

        let duration_secs = chunk.duration_secs();
        if duration_secs < self.min_secs {
            return Err(AudioError::TooShort {
                min_secs: self.min_secs,
                got_secs: duration_secs,
            });
        }

        let rms = chunk.rms();
        if rms < self.silence_rms {
            return Err(AudioError::Silent {
                rms,
                threshold: self.silence_rms,
            });
        }

        let clipped = chunk
            .samples
            .iter()
            .filter(|&&s| s.abs() > self.clipping_threshold)
            .count();
        let clipped_pct = clipped as f32 / chunk.samples.len() as f32 * 100.0;
        if clipped_pct > self.clipping_max_pct {
            return Err(AudioError::Clipping {
                clipped_pct,
                max_pct: self.clipping_max_pct,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(secs: f32, amplitude: f32) -> AudioChunk {
        let n = (secs * 24_000.0) as usize;
        AudioChunk::new(0, vec![amplitude; n], 24_000)
    }

    #[test]
    fn valid_chunk_passes() {
        assert!(AudioQuality::default().validate(&make_chunk(1.0, 0.3)).is_ok());
    }

    #[test]
    fn empty_rejected() {
        let err = AudioQuality::default()
            .validate(&AudioChunk::new(7, vec![], 24_000))
            .unwrap_err();
        assert_eq!(err, AudioError::Empty { index: 7 });
    }

    #[test]
    fn too_short_rejected() {
        let err = AudioQuality::new(0.5, 1e-4)
            .validate(&make_chunk(0.1, 0.3))
            .unwrap_err();
        assert!(matches!(err, AudioError::TooShort { .. }), "{err}");
    }

    #[test]
    fn silent_rejected() {
        let err = AudioQuality::default()
            .validate(&make_chunk(1.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, AudioError::Silent { .. }), "{err}");
    }

    #[test]
    fn clipping_rejected() {
        let err = AudioQuality::default()
            .validate(&make_chunk(1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, AudioError::Clipping { .. }), "{err}");
    }

    #[test]
    fn from_config_uses_audio_settings() {
        let config = AudioConfig {
            min_chunk_secs: 0.2,
            silence_rms: 0.01,
            ..AudioConfig::default()
        };
        let q = AudioQuality::from_config(&config);
        assert_eq!(q.min_secs, 0.2);
        assert_eq!(q.silence_rms, 0.01);
    }

    #[test]
    fn error_display_is_informative() {
        let msg = AudioError::TooShort {
            min_secs: 0.5,
            got_secs: 0.1,
        }
        .to_string();
        assert!(msg.contains("0.100"), "message: {msg}");
        assert!(msg.contains("0.500"), "message: {msg}");
    }
}
