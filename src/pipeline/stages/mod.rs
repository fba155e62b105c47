//! Per-stage transformation logic.
//!
//! Each stage reads its input artifact from the job [`Workspace`] and writes
//! its output artifact back.  Stages never touch the job record: success is
//! decided by the stage runner after re-reading the artifacts from disk.
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | [`ExtractionStage`] | source document | `extracted/document.txt` |
//! | [`StagingStage`] | extracted text | `staged/segments.json` |
//! | [`SynthesisStage`] | manifest | `voices/chunk-NNNN.wav` |
//! | [`MergeStage`] | chunks + manifest | `final/narration.*` |
//! | [`CleanupStage`] | workspace | `cleanup.json` |

pub mod cleanup;
pub mod extraction;
pub mod merge;
pub mod staging;
pub mod synthesis;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::workspace::Workspace;

pub use cleanup::{CleanupReport, CleanupStage};
pub use extraction::ExtractionStage;
pub use merge::{MergeStage, Timeline, TimelineEntry};
pub use staging::StagingStage;
pub use synthesis::SynthesisStage;

/// Everything a stage may read while it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: String,
    pub source: PathBuf,
    pub workspace: Workspace,
    /// Effective configuration: application settings with the job's
    /// snapshotted options applied.
    pub config: Arc<AppConfig>,
    pub cancel: CancellationToken,
}

/// The work of one stage.  Returning `Ok(())` only claims completion; the
/// runner still verifies the artifacts.
#[async_trait]
pub trait StageLogic: Send + Sync {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn StageLogic>) {}
};
