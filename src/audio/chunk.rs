//! Synthesised audio for one text segment.

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// Mono `f32` PCM produced for exactly one [`TextSegment`].
///
/// `index` is the originating segment's ordinal, so chunks synthesised out of
/// order can be re-sorted before merging.  Ownership of the sample buffer
/// moves into the merge step, which drops it once the narration is written.
///
/// [`TextSegment`]: crate::voice::TextSegment
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Segment index this audio belongs to.
    pub index: usize,
    /// Mono PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(index: usize, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            index,
            samples,
            sample_rate,
        }
    }

    /// Length in seconds.  Zero when the sample rate is unknown.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the buffer.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

/// Root-mean-square level of `samples`; `0.0` for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}
