//! WAV encode/decode via `hound`.
//!
//! Every chunk and the final narration are stored as 16-bit mono PCM.  Files
//! are written to a temporary sibling and renamed into place, so a reader
//! never observes a half-written artifact under the final name.

use std::io::{BufWriter, Cursor, Read};
use std::path::Path;

use thiserror::Error;

use crate::audio::chunk::AudioChunk;
use crate::audio::resample::downmix;

// ---------------------------------------------------------------------------
// WavError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WavError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid WAV data: {0}")]
    Format(#[from] hound::Error),

    #[error("WAV contains no audio frames")]
    NoFrames,
}

// ---------------------------------------------------------------------------
// WavInfo
// ---------------------------------------------------------------------------

/// Header facts of a structurally valid WAV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per channel.
    pub frames: u32,
}

impl WavInfo {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32), WavError> {
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok((downmix(&interleaved, spec.channels), spec.sample_rate))
}

/// Read a WAV file into a mono [`AudioChunk`] tagged with `index`.
pub fn read_chunk(path: &Path, index: usize) -> Result<AudioChunk, WavError> {
    let reader = hound::WavReader::open(path)?;
    let (samples, sample_rate) = decode(reader)?;
    Ok(AudioChunk::new(index, samples, sample_rate))
}

/// Decode an in-memory WAV payload (e.g. an HTTP response body).
pub fn decode_bytes(bytes: &[u8], index: usize) -> Result<AudioChunk, WavError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let (samples, sample_rate) = decode(reader)?;
    Ok(AudioChunk::new(index, samples, sample_rate))
}

/// Parse the header and walk every sample.  Fails on a truncated data
/// section or a file with zero frames.
pub fn inspect(path: &Path) -> Result<WavInfo, WavError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration();
    if frames == 0 {
        return Err(WavError::NoFrames);
    }
    match spec.sample_format {
        hound::SampleFormat::Float => {
            for s in reader.samples::<f32>() {
                s?;
            }
        }
        hound::SampleFormat::Int => {
            for s in reader.samples::<i32>() {
                s?;
            }
        }
    }
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames,
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn spec_16bit_mono(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// Write 16-bit mono PCM to `path`, atomically replacing any existing file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), WavError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer =
            hound::WavWriter::new(BufWriter::new(tmp.as_file()), spec_16bit_mono(sample_rate))?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| WavError::Io(e.error))?;
    Ok(())
}

pub fn write_chunk(path: &Path, chunk: &AudioChunk) -> Result<(), WavError> {
    write_wav(path, &chunk.samples, chunk.sample_rate)
}

/// Encode 16-bit mono PCM into an in-memory WAV payload.
pub fn encode_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec_16bit_mono(sample_rate))?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
