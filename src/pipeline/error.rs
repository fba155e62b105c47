//! Pipeline error taxonomy.
//!
//! | Kind | Retried by the stage runner | Typical source |
//! |------|-----------------------------|----------------|
//! | `extraction` | never | unreadable or unsupported source |
//! | `reasoning_unavailable` | yes | advisor timeout / quota |
//! | `synthesis` | when every provider failed transiently | gateway |
//! | `merge` | on I/O or encoder failures | merge stage |
//! | `artifact_verification` | never | stage output missing or invalid |
//! | `state_corruption` | never | succeeded stage lost its artifact |
//! | `io` | yes | workspace filesystem |
//! | `cancelled` | never | job cancellation token |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advisor::AdvisorError;
use crate::audio::{MergeError, WavError};
use crate::pipeline::stage::Stage;
use crate::synthesis::SynthesisError;
use crate::text::ExtractionError;

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Stable, serialisable classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Extraction,
    ReasoningUnavailable,
    Synthesis,
    Merge,
    ArtifactVerification,
    StateCorruption,
    InvalidInput,
    Io,
    Cancelled,
    JobNotFound,
    JobBusy,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::ReasoningUnavailable => "reasoning_unavailable",
            Self::Synthesis => "synthesis",
            Self::Merge => "merge",
            Self::ArtifactVerification => "artifact_verification",
            Self::StateCorruption => "state_corruption",
            Self::InvalidInput => "invalid_input",
            Self::Io => "io",
            Self::Cancelled => "cancelled",
            Self::JobNotFound => "job_not_found",
            Self::JobBusy => "job_busy",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("reasoning unavailable: {0}")]
    ReasoningUnavailable(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("{stage} output failed verification: {path}: {reason}")]
    ArtifactVerification {
        stage: Stage,
        path: PathBuf,
        reason: String,
    },

    /// A stage recorded as succeeded no longer has a valid artifact, or the
    /// job record itself is unreadable.
    #[error("state corruption in job {job_id}: {detail}")]
    StateCorruption { job_id: String, detail: String },

    #[error("invalid stage input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job cancelled")]
    Cancelled,

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {0} is already being advanced by another caller")]
    JobBusy(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Extraction(_) => FailureKind::Extraction,
            Self::ReasoningUnavailable(_) => FailureKind::ReasoningUnavailable,
            Self::Synthesis(SynthesisError::Cancelled) => FailureKind::Cancelled,
            Self::Synthesis(_) => FailureKind::Synthesis,
            Self::Merge(MergeError::Io(_)) => FailureKind::Io,
            Self::Merge(_) => FailureKind::Merge,
            Self::ArtifactVerification { .. } => FailureKind::ArtifactVerification,
            Self::StateCorruption { .. } => FailureKind::StateCorruption,
            Self::InvalidInput(_) | Self::Json(_) => FailureKind::InvalidInput,
            Self::Io(_) => FailureKind::Io,
            Self::Cancelled => FailureKind::Cancelled,
            Self::JobNotFound(_) => FailureKind::JobNotFound,
            Self::JobBusy(_) => FailureKind::JobBusy,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether another attempt of the same stage could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ReasoningUnavailable(_) | Self::Io(_) => true,
            Self::Synthesis(SynthesisError::Exhausted { .. }) => true,
            Self::Merge(MergeError::Io(_) | MergeError::Encoder { .. } | MergeError::Timeout { .. }) => {
                true
            }
            Self::Merge(MergeError::Wav(WavError::Io(_))) => true,
            _ => false,
        }
    }
}

impl From<AdvisorError> for PipelineError {
    fn from(e: AdvisorError) -> Self {
        PipelineError::ReasoningUnavailable(e.to_string())
    }
}

impl From<WavError> for PipelineError {
    fn from(e: WavError) -> Self {
        PipelineError::Merge(MergeError::Wav(e))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::Internal(e.to_string())
        }
    }
}
