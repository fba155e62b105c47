//! The fixed stage sequence and per-stage progress records.
//!
//! ```text
//! Extraction ─▶ Staging ─▶ Synthesis ─▶ Merge ─▶ Cleanup
//! ```
//!
//! Each [`StageRecord`] moves through:
//!
//! ```text
//! Pending ──attempt──▶ Running ──verified──▶ Succeeded
//!                         │
//!                         └──error──▶ Failed ──retry──▶ Running
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Staging,
    Synthesis,
    Merge,
    Cleanup,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Extraction,
        Stage::Staging,
        Stage::Synthesis,
        Stage::Merge,
        Stage::Cleanup,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Staging => "staging",
            Self::Synthesis => "synthesis",
            Self::Merge => "merge",
            Self::Cleanup => "cleanup",
        }
    }

    /// Zero-based position in [`Stage::ALL`].
    pub fn position(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// StageStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

// ---------------------------------------------------------------------------
// AttemptRecord
// ---------------------------------------------------------------------------

/// One entry of a stage's append-only attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// `Running` until the attempt finishes, then `Succeeded` or `Failed`.
    pub outcome: StageStatus,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// StageRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: Stage,
    pub status: StageStatus,
    /// Total attempts across all runs of the job, including resumes.
    pub attempts: u32,
    /// Workspace-relative artifact paths, set once the stage succeeds.
    pub outputs: Vec<PathBuf>,
    /// Last error, cleared on success.
    pub error: Option<String>,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
}

impl StageRecord {
    pub fn new(name: Stage) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            attempts: 0,
            outputs: Vec::new(),
            error: None,
            history: Vec::new(),
        }
    }

    /// Mark a new attempt as running and return its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.status = StageStatus::Running;
        self.history.push(AttemptRecord {
            attempt: self.attempts,
            started_at: Utc::now(),
            finished_at: None,
            outcome: StageStatus::Running,
            error: None,
        });
        self.attempts
    }

    pub fn succeed(&mut self, outputs: Vec<PathBuf>) {
        self.status = StageStatus::Succeeded;
        self.outputs = outputs;
        self.error = None;
        self.finish_attempt(StageStatus::Succeeded, None);
    }

    pub fn fail(&mut self, error: String) {
        self.status = StageStatus::Failed;
        self.error = Some(error.clone());
        self.finish_attempt(StageStatus::Failed, Some(error));
    }

    /// Put a stage interrupted mid-attempt back in the queue.
    pub fn reset_interrupted(&mut self) {
        if self.status == StageStatus::Running {
            self.status = StageStatus::Pending;
            self.finish_attempt(StageStatus::Failed, Some("interrupted".into()));
        }
    }

    /// Queue a succeeded stage to run again because an earlier stage is
    /// being re-run.  History is kept.
    pub fn requeue(&mut self) {
        self.status = StageStatus::Pending;
        self.outputs.clear();
    }

    fn finish_attempt(&mut self, outcome: StageStatus, error: Option<String>) {
        if let Some(last) = self.history.last_mut() {
            if last.outcome == StageStatus::Running {
                last.finished_at = Some(Utc::now());
                last.outcome = outcome;
                last.error = error;
            }
        }
    }
}
