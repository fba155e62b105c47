//! Cleanup: drop intermediates once the final narration is verified.
//!
//! `voices/` is removed unless `audio.keep_intermediates` is set.  The
//! extracted text, the manifest, the final outputs and `job.json` stay.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::error::PipelineError;
use crate::pipeline::workspace::write_json_atomic;

use super::{StageContext, StageLogic};

/// `cleanup.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Workspace-relative paths that were deleted.
    pub removed: Vec<PathBuf>,
    pub kept_intermediates: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct CleanupStage;

impl CleanupStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageLogic for CleanupStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let keep = ctx.config.audio.keep_intermediates;
        let mut removed = Vec::new();

        let voices = ctx.workspace.voices_dir();
        if !keep && tokio::fs::try_exists(&voices).await? {
            tokio::fs::remove_dir_all(&voices).await?;
            log::info!("cleanup: removed {}", voices.display());
            removed.push(ctx.workspace.relative(&voices));
        }
        for partial in leftover_partials(ctx).await? {
            tokio::fs::remove_file(&partial).await?;
            log::debug!("cleanup: removed {}", partial.display());
            removed.push(ctx.workspace.relative(&partial));
        }

        let report = CleanupReport {
            removed,
            kept_intermediates: keep,
            finished_at: Some(Utc::now()),
        };
        write_json_atomic(&ctx.workspace.cleanup_report(), &report)
    }
}

/// Interrupted encoder outputs left in `final/`.
async fn leftover_partials(ctx: &StageContext) -> Result<Vec<PathBuf>, PipelineError> {
    let dir = ctx.workspace.final_dir();
    let mut found = Vec::new();
    if !tokio::fs::try_exists(&dir).await? {
        return Ok(found);
    }
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "part") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
