//! Job state machine and its durable record.
//!
//! [`Job`] is the single source of truth for a job's progress.  The
//! orchestrator mutates it and [`JobStore`] persists it as `job.json`,
//! replaced atomically after every transition:
//!
//! ```text
//! Pending ──start/resume──▶ Running ──cleanup verified──▶ Completed
//!                              │
//!                              └──stage exhausted / cancelled──▶ Failed ──resume──▶ Running
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, ExportFormat, ProviderPreference, RetryConfig};
use crate::pipeline::error::{FailureKind, PipelineError};
use crate::pipeline::stage::{Stage, StageRecord, StageStatus};
use crate::pipeline::workspace::{write_json_atomic, Workspace};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

// ---------------------------------------------------------------------------
// JobOptions
// ---------------------------------------------------------------------------

/// Job-relevant settings, snapshotted at creation so `resume` runs with the
/// options the job started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    pub max_segment_chars: usize,
    pub provider: ProviderPreference,
    pub retry: RetryConfig,
    /// Formats the merge stage produced; verification expects exactly these.
    #[serde(default = "default_export_formats")]
    pub export_formats: Vec<ExportFormat>,
    #[serde(default)]
    pub keep_intermediates: bool,
}

fn default_export_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Wav]
}

impl JobOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_segment_chars: config.segmentation.max_segment_chars,
            provider: config.synthesis.provider,
            retry: config.retry.clone(),
            export_formats: config.audio.export_formats.clone(),
            keep_intermediates: config.audio.keep_intermediates,
        }
    }

    /// `config` with these options layered on top.
    pub fn apply(&self, config: &AppConfig) -> AppConfig {
        let mut effective = config.clone();
        effective.segmentation.max_segment_chars = self.max_segment_chars.max(1);
        effective.synthesis.provider = self.provider;
        effective.retry = self.retry.clone();
        effective.audio.export_formats = self.export_formats.clone();
        effective.audio.keep_intermediates = self.keep_intermediates;
        effective
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// JobFailure
// ---------------------------------------------------------------------------

/// Structured description of why a job stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: Stage,
    pub attempts: u32,
    pub kind: FailureKind,
    pub cause: String,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stage {} failed after {} attempt(s) [{}]: {}",
            self.stage, self.attempts, self.kind, self.cause
        )
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub source: PathBuf,
    pub status: JobStatus,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// One record per stage, in execution order.
    pub stages: Vec<StageRecord>,
    /// Workspace-relative path of the exported narration once completed.
    #[serde(default)]
    pub final_artifact: Option<PathBuf>,
    #[serde(default)]
    pub failure: Option<JobFailure>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, source: impl Into<PathBuf>, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            source: source.into(),
            status: JobStatus::Pending,
            options,
            created_at: now,
            updated_at: now,
            stages: Stage::ALL.iter().map(|&s| StageRecord::new(s)).collect(),
            final_artifact: None,
            failure: None,
        }
    }

    pub fn record(&self, stage: Stage) -> &StageRecord {
        &self.stages[stage.position()]
    }

    pub fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        &mut self.stages[stage.position()]
    }

    /// First stage not yet succeeded, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|r| r.status != StageStatus::Succeeded)
            .map(|r| r.name)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Structural sanity of a loaded record: exactly one record per stage,
    /// in order.
    pub fn check_shape(&self) -> Result<(), String> {
        let names: Vec<Stage> = self.stages.iter().map(|r| r.name).collect();
        if names != Stage::ALL {
            return Err(format!("stage records out of order or incomplete: {names:?}"));
        }
        Ok(())
    }
}

/// Fresh job identifier of the form `job_<8 hex>`.
pub fn new_job_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("job_{}", &id[..8])
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Persists jobs under `<output_dir>/<job_id>/job.json`.
#[derive(Debug, Clone)]
pub struct JobStore {
    output_dir: PathBuf,
}

impl JobStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn workspace(&self, job_id: &str) -> Workspace {
        Workspace::for_job(&self.output_dir, job_id)
    }

    pub fn exists(&self, job_id: &str) -> bool {
        self.workspace(job_id).state_file().exists()
    }

    /// Persist a new job.  Fails if a job with the same id already exists.
    pub fn create(&self, job: &Job) -> Result<(), PipelineError> {
        if self.exists(&job.job_id) {
            return Err(PipelineError::InvalidInput(format!(
                "job {} already exists; resume it instead",
                job.job_id
            )));
        }
        std::fs::create_dir_all(self.workspace(&job.job_id).root())?;
        self.save(job)
    }

    /// Atomically replace the job's state file.
    pub fn save(&self, job: &Job) -> Result<(), PipelineError> {
        write_json_atomic(&self.workspace(&job.job_id).state_file(), job)
    }

    /// Load a job.  A missing state file is `JobNotFound`; an unreadable one
    /// is `StateCorruption`.
    pub fn load(&self, job_id: &str) -> Result<Job, PipelineError> {
        let path = self.workspace(job_id).state_file();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::JobNotFound(job_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let corrupt = |detail: String| PipelineError::StateCorruption {
            job_id: job_id.to_string(),
            detail,
        };
        let job: Job = serde_json::from_slice(&bytes)
            .map_err(|e| corrupt(format!("{} is unreadable: {e}", path.display())))?;
        if job.job_id != job_id {
            return Err(corrupt(format!("{} belongs to job {}", path.display(), job.job_id)));
        }
        job.check_shape().map_err(corrupt)?;
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
