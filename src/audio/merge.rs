//! Chunk concatenation, loudness normalisation and export.
//!
//! ```text
//! chunks (any order) → sort by index → resample → join with pause
//!                    → RMS normalise (peak-limited) → 16-bit WAV [→ MP3]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::audio::chunk::{peak, rms, AudioChunk};
use crate::audio::resample::resample;
use crate::audio::wav::WavError;
use crate::config::AudioConfig;

/// Normalisation never pushes a sample above this level.
pub const PEAK_CEILING: f32 = 0.98;

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no audio chunks to merge")]
    NoChunks,

    #[error("chunk index {0} appears more than once")]
    DuplicateIndex(usize),

    #[error("output sample rate must be positive")]
    InvalidSampleRate,

    #[error(transparent)]
    Wav(#[from] WavError),

    #[error("{tool} failed: {detail}")]
    Encoder { tool: String, detail: String },

    #[error("{tool} timed out after {secs} s")]
    Timeout { tool: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Options and output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Silence inserted between consecutive chunks.
    pub pause_ms: u32,
    /// RMS loudness target in dBFS.
    pub target_dbfs: f32,
}

impl MergeOptions {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            pause_ms: config.pause_ms,
            target_dbfs: config.target_dbfs,
        }
    }
}

/// Where one chunk landed in the merged narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub index: usize,
    pub start_secs: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// One span per input chunk, in index order.
    pub spans: Vec<ChunkSpan>,
}

impl MergedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

// ---------------------------------------------------------------------------
// merge_chunks
// ---------------------------------------------------------------------------

/// Concatenate `chunks` in index order.
///
/// Takes ownership of the buffers; each one is released as soon as it has
/// been copied into the output.
pub fn merge_chunks(
    mut chunks: Vec<AudioChunk>,
    options: &MergeOptions,
) -> Result<MergedAudio, MergeError> {
    if chunks.is_empty() {
        return Err(MergeError::NoChunks);
    }
    if options.sample_rate == 0 {
        return Err(MergeError::InvalidSampleRate);
    }
    chunks.sort_by_key(|c| c.index);
    if let Some(dup) = chunks.windows(2).find(|w| w[0].index == w[1].index) {
        return Err(MergeError::DuplicateIndex(dup[0].index));
    }

    let rate = options.sample_rate;
    let pause_len = (rate as u64 * options.pause_ms as u64 / 1000) as usize;
    let mut samples: Vec<f32> = Vec::new();
    let mut spans = Vec::with_capacity(chunks.len());

    for (position, chunk) in chunks.into_iter().enumerate() {
        if position > 0 {
            samples.resize(samples.len() + pause_len, 0.0);
        }
        let start = samples.len();
        samples.extend(resample(&chunk.samples, chunk.sample_rate, rate));
        spans.push(ChunkSpan {
            index: chunk.index,
            start_secs: start as f64 / rate as f64,
            duration_secs: (samples.len() - start) as f64 / rate as f64,
        });
    }

    let gain = normalize_rms(&mut samples, options.target_dbfs);
    log::debug!(
        "merge: {} chunks, {:.1}s, gain {gain:.3}",
        spans.len(),
        samples.len() as f64 / rate as f64
    );

    Ok(MergedAudio {
        samples,
        sample_rate: rate,
        spans,
    })
}

/// Scale `samples` so their RMS level reaches `target_dbfs`, limited so the
/// peak stays at or below [`PEAK_CEILING`].  Returns the gain applied.
/// Silent input is left untouched.
pub fn normalize_rms(samples: &mut [f32], target_dbfs: f32) -> f32 {
    let level = rms(samples);
    if level <= f32::EPSILON {
        return 1.0;
    }
    let target = 10f32.powf(target_dbfs / 20.0);
    let mut gain = target / level;

    let top = peak(samples);
    if top * gain > PEAK_CEILING {
        gain = PEAK_CEILING / top;
    }
    for s in samples.iter_mut() {
        *s *= gain;
    }
    gain
}

// ---------------------------------------------------------------------------
// MP3 export
// ---------------------------------------------------------------------------

/// Transcode `wav` into `mp3` with an external `ffmpeg`.  The output is
/// written under a temporary name and renamed on success.
pub async fn encode_mp3(
    ffmpeg: &str,
    wav: &Path,
    mp3: &Path,
    timeout: Duration,
) -> Result<(), MergeError> {
    let partial = mp3.with_extension("mp3.part");
    let mut command = Command::new(ffmpeg);
    command
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(wav)
        .args(["-codec:a", "libmp3lame", "-qscale:a", "2", "-f", "mp3"])
        .arg(&partial)
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|e| MergeError::Encoder {
            tool: ffmpeg.to_string(),
            detail: e.to_string(),
        })?,
        Err(_) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(MergeError::Timeout {
                tool: ffmpeg.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(MergeError::Encoder {
            tool: ffmpeg.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    tokio::fs::rename(&partial, mp3).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
