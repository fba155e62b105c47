//! Speech provider trait and its error taxonomy.
//!
//! [`SpeechProvider`] is the interface the gateway drives.  It is object-safe
//! and `Send + Sync` so providers can be held as `Arc<dyn SpeechProvider>`
//! and shared across synthesis workers.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioChunk;
use crate::voice::{TextSegment, Tone, VoiceIdentity};

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// How a provider is scheduled.  `Local` providers hold an exclusive
/// resource (an accelerator) and are serialized; `Cloud` providers may run
/// concurrently up to the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cloud,
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => f.write_str("cloud"),
            Self::Local => f.write_str("local"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exhausted: {0}")]
    Quota(String),

    #[error("timed out after {secs} s")]
    Timeout { secs: u64 },

    /// Provider is disabled, not installed, or reported a server-side fault.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered, but the audio is unusable.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// This provider refused the request (a 4xx other than auth or quota).
    /// The next provider may still accept it.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// `true` when the provider refused the request rather than failing to
    /// serve it.  A segment every provider refuses is terminally rejected.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

// ---------------------------------------------------------------------------
// SynthesisRequest
// ---------------------------------------------------------------------------

/// Everything a provider needs to voice one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub index: usize,
    pub text: String,
    /// Voice identity key (`narrator`, `male`, `Alice` ...).
    pub voice: String,
    /// Reference-voice sample for cloning.
    pub reference: PathBuf,
    pub speed: f64,
    pub tone: Tone,
}

impl SynthesisRequest {
    pub fn new(segment: &TextSegment, voice: &VoiceIdentity) -> Self {
        Self {
            index: segment.index,
            text: segment.text.clone(),
            voice: voice.key.clone(),
            reference: voice.reference.clone(),
            speed: segment.speed,
            tone: segment.tone,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechProvider trait
// ---------------------------------------------------------------------------

/// A text-to-speech backend.
///
/// # Contract
///
/// - `synthesize` returns mono audio whose `index` equals `request.index`.
/// - `release` frees whatever the provider holds between calls (accelerator
///   memory, scratch files).  The gateway calls it after every call to a
///   `Local` provider, successful or not.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunk, ProviderError>;

    async fn release(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechProvider>) {}
};
