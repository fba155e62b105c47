//! Job pipeline: stage sequencing, retries, verification and persistence.
//!
//! # Architecture
//!
//! ```text
//! PipelineOrchestrator::generate / resume
//!        │  JobLock (one caller per job)
//!        │  JobStore (job.json, atomic replace)
//!        ▼
//! StageRunner::run(stage)            ← per-stage attempt budget + backoff
//!        │
//!        ├─ StageLogic::run          ← stages::{Extraction, Staging, Synthesis, Merge, Cleanup}
//!        └─ verify_stage             ← artifacts on disk must check out
//!
//! <output_dir>/<job_id>/
//!   job.json
//!   extracted/document.txt
//!   staged/segments.json
//!   voices/chunk-NNNN.wav
//!   final/narration.{wav,mp3,json}
//!   cleanup.json
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use narrator::config::AppConfig;
//! use narrator::pipeline::{JobOptions, PipelineOrchestrator};
//! use narrator::voice::VoiceOverrides;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(AppConfig::load()?);
//!     let options = JobOptions::from_config(&config);
//!     let orchestrator = PipelineOrchestrator::new(config, VoiceOverrides::load()?);
//!
//!     let result = orchestrator
//!         .generate(Path::new("book.txt"), Path::new("jobs"), options)
//!         .await?;
//!     if !result.succeeded() {
//!         let resumed = orchestrator.resume(Path::new("jobs"), &result.job_id).await?;
//!         println!("{:?}", resumed.status);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod state;
pub mod verify;
pub mod workspace;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use error::{FailureKind, PipelineError};
pub use lock::JobLock;
pub use orchestrator::{JobResult, PipelineOrchestrator};
pub use runner::{RetryPolicy, StageResult, StageRunner};
pub use stage::{AttemptRecord, Stage, StageRecord, StageStatus};
pub use stages::{StageContext, StageLogic};
pub use state::{new_job_id, Job, JobFailure, JobOptions, JobStatus, JobStore};
pub use verify::{verify_stage, ArtifactError};
pub use workspace::Workspace;
