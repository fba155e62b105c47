//! Audio handling: synthesised chunks, WAV I/O, quality checks and merging.
//!
//! # Pipeline
//!
//! ```text
//! provider → AudioChunk → AudioQuality → voices/chunk-NNNN.wav (wav)
//!          → merge_chunks (resample, pause, normalise) → final/narration.wav
//! ```

pub mod chunk;
pub mod merge;
pub mod quality;
pub mod resample;
pub mod wav;

pub use chunk::AudioChunk;
pub use merge::{encode_mp3, merge_chunks, ChunkSpan, MergeError, MergeOptions, MergedAudio};
pub use quality::{AudioError, AudioQuality};
pub use resample::{downmix, resample};
pub use wav::{WavError, WavInfo};
