//! Stage runner: one stage, its attempts, and the verification gate.
//!
//! # Attempt loop
//!
//! ```text
//! begin_attempt ─▶ persist ─▶ StageLogic::run ──Ok──▶ verify_stage ──Ok──▶ succeed ─▶ persist ─▶ done
//!                                   │                     │
//!                                   └──Err──┐   ┌──Err────┘
//!                                           ▼   ▼
//!                                     fail ─▶ persist
//!                                           │
//!                    retryable and attempts left? ──yes──▶ backoff ─▶ next attempt
//!                                           │
//!                                           └──no──▶ report failure
//! ```
//!
//! A stage is never marked succeeded because its logic returned `Ok`: the
//! artifacts are read back and checked first.  Verification failures are
//! never retried.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::stage::{Stage, StageStatus};
use crate::pipeline::stages::{StageContext, StageLogic};
use crate::pipeline::state::{Job, JobStore};
use crate::pipeline::verify::verify_stage;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt budgets and exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Attempts allowed for `stage` in one run.  Always at least one.
    pub fn attempts_for(&self, stage: Stage) -> u32 {
        let attempts = match stage {
            Stage::Extraction => self.config.extraction_attempts,
            Stage::Staging => self.config.staging_attempts,
            Stage::Synthesis => self.config.synthesis_attempts,
            Stage::Merge => self.config.merge_attempts,
            Stage::Cleanup => self.config.cleanup_attempts,
        };
        attempts.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .config
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.config.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// Outcome of [`StageRunner::run`].
#[derive(Debug)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    /// Workspace-relative paths of the verified artifacts.
    pub output_paths: Vec<PathBuf>,
    /// Last error when `success` is false.
    pub error: Option<PipelineError>,
    /// Attempts recorded for the stage so far, across runs.
    pub attempts: u32,
}

impl StageResult {
    fn succeeded(stage: Stage, output_paths: Vec<PathBuf>, attempts: u32) -> Self {
        Self {
            stage,
            success: true,
            output_paths,
            error: None,
            attempts,
        }
    }

    fn failed(stage: Stage, error: PipelineError, attempts: u32) -> Self {
        Self {
            stage,
            success: false,
            output_paths: Vec::new(),
            error: Some(error),
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// StageRunner
// ---------------------------------------------------------------------------

/// Executes one stage for a job, with retries and verification.
#[derive(Debug, Clone)]
pub struct StageRunner {
    policy: RetryPolicy,
}

impl StageRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `stage` until it succeeds, fails terminally, or runs out of
    /// attempts.  `job` is persisted through `store` after every transition.
    pub async fn run(
        &self,
        job: &mut Job,
        stage: Stage,
        logic: &dyn StageLogic,
        ctx: &StageContext,
        store: &JobStore,
    ) -> StageResult {
        let max = self.policy.attempts_for(stage);

        for round in 1..=max {
            if ctx.cancel.is_cancelled() {
                return self.give_up(job, stage, PipelineError::Cancelled, store);
            }

            let attempt = job.record_mut(stage).begin_attempt();
            job.touch();
            if let Err(e) = store.save(job) {
                return StageResult::failed(stage, e, attempt);
            }
            log::info!(
                "pipeline: {} {stage} attempt {attempt} ({round}/{max})",
                job.job_id
            );

            let outcome = tokio::select! {
                _ = ctx.cancel.cancelled() => Err(PipelineError::Cancelled),
                result = logic.run(ctx) => result,
            };
            let verified = outcome.and_then(|()| {
                verify_stage(stage, &ctx.workspace, &ctx.config)
                    .map_err(|e| e.into_pipeline(stage))
            });

            let error = match verified {
                Ok(outputs) => {
                    log::info!(
                        "pipeline: {} {stage} succeeded, verified {} artifact(s)",
                        job.job_id,
                        outputs.len()
                    );
                    job.record_mut(stage).succeed(outputs.clone());
                    job.touch();
                    if let Err(e) = store.save(job) {
                        return StageResult::failed(stage, e, attempt);
                    }
                    return StageResult::succeeded(stage, outputs, attempt);
                }
                Err(error) => error,
            };

            job.record_mut(stage).fail(error.to_string());
            job.touch();
            if let Err(e) = store.save(job) {
                log::error!("pipeline: {} could not persist failure: {e}", job.job_id);
            }

            if !error.is_retryable() || round == max {
                log::error!(
                    "pipeline: {} {stage} failed after attempt {attempt} [{}]: {error}",
                    job.job_id,
                    error.kind()
                );
                return StageResult::failed(stage, error, attempt);
            }

            let delay = self.policy.backoff(round);
            log::warn!(
                "pipeline: {} {stage} attempt {attempt} failed: {error}; retrying in {delay:?}",
                job.job_id
            );
            tokio::select! {
                _ = ctx.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // `attempts_for` is never zero, so the loop always returns.
        let attempts = job.record(stage).attempts;
        StageResult::failed(
            stage,
            PipelineError::Internal(format!("{stage} was given no attempts")),
            attempts,
        )
    }

    /// Record a failure without starting an attempt.
    fn give_up(
        &self,
        job: &mut Job,
        stage: Stage,
        error: PipelineError,
        store: &JobStore,
    ) -> StageResult {
        let record = job.record_mut(stage);
        record.status = StageStatus::Failed;
        record.error = Some(error.to_string());
        let attempts = record.attempts;
        job.touch();
        if let Err(e) = store.save(job) {
            log::error!("pipeline: {} could not persist failure: {e}", job.job_id);
        }
        StageResult::failed(stage, error, attempts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::error::FailureKind;
    use crate::pipeline::state::JobOptions;
    use crate::pipeline::workspace::write_atomic;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Fails the first `failures` calls with `error`, then writes the
    /// extracted text (unless `lie` is set, in which case it writes nothing).
    struct FlakyExtraction {
        failures: u32,
        error: fn() -> PipelineError,
        lie: bool,
        calls: AtomicU32,
    }

    impl FlakyExtraction {
        fn new(failures: u32, error: fn() -> PipelineError) -> Self {
            Self {
                failures,
                error,
                lie: false,
                calls: AtomicU32::new(0),
            }
        }

        fn lying() -> Self {
            Self {
                lie: true,
                ..Self::new(0, io_error)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageLogic for FlakyExtraction {
        async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            if !self.lie {
                write_atomic(&ctx.workspace.extracted_text(), b"Some text.")?;
            }
            Ok(())
        }
    }

    fn io_error() -> PipelineError {
        PipelineError::Io(std::io::Error::other("disk hiccup"))
    }

    fn bad_input() -> PipelineError {
        PipelineError::InvalidInput("nonsense".into())
    }

    fn setup(dir: &std::path::Path, extraction_attempts: u32) -> (Job, JobStore, StageContext, StageRunner) {
        let store = JobStore::new(dir);
        let job = Job::new("job_run", dir.join("book.txt"), JobOptions::default());
        store.create(&job).unwrap();
        let ctx = StageContext {
            job_id: job.job_id.clone(),
            source: job.source.clone(),
            workspace: store.workspace(&job.job_id),
            config: Arc::new(AppConfig::default()),
            cancel: CancellationToken::new(),
        };
        let runner = StageRunner::new(RetryPolicy::new(RetryConfig {
            extraction_attempts,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            ..RetryConfig::default()
        }));
        (job, store, ctx, runner)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(RetryConfig {
            backoff_base_ms: 100,
            backoff_max_ms: 350,
            ..RetryConfig::default()
        });
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn default_budgets() {
        let policy = RetryPolicy::new(RetryConfig::default());
        assert_eq!(policy.attempts_for(Stage::Synthesis), 3);
        assert_eq!(policy.attempts_for(Stage::Extraction), 1);
        assert_eq!(policy.attempts_for(Stage::Cleanup), 1);
        let zero = RetryPolicy::new(RetryConfig {
            merge_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(zero.attempts_for(Stage::Merge), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (mut job, store, ctx, runner) = setup(dir.path(), 3);
        let logic = FlakyExtraction::new(2, io_error);

        let result = runner.run(&mut job, Stage::Extraction, &logic, &ctx, &store).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.output_paths, vec![PathBuf::from("extracted/document.txt")]);
        assert_eq!(logic.calls(), 3);

        let saved = store.load("job_run").unwrap();
        let record = saved.record(Stage::Extraction);
        assert_eq!(record.status, StageStatus::Succeeded);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.history[0].outcome, StageStatus::Failed);
    }

    #[tokio::test]
    async fn exhausting_attempts_preserves_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut job, store, ctx, runner) = setup(dir.path(), 2);
        let logic = FlakyExtraction::new(u32::MAX, io_error);

        let result = runner.run(&mut job, Stage::Extraction, &logic, &ctx, &store).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.error.unwrap().kind(), FailureKind::Io);

        let saved = store.load("job_run").unwrap();
        assert_eq!(saved.record(Stage::Extraction).status, StageStatus::Failed);
        assert!(saved.record(Stage::Extraction).error.as_deref().unwrap().contains("disk hiccup"));
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (mut job, store, ctx, runner) = setup(dir.path(), 3);
        let logic = FlakyExtraction::new(u32::MAX, bad_input);

        let result = runner.run(&mut job, Stage::Extraction, &logic, &ctx, &store).await;
        assert!(!result.success);
        assert_eq!(logic.calls(), 1);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn claimed_success_without_artifact_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let (mut job, store, ctx, runner) = setup(dir.path(), 3);
        let logic = FlakyExtraction::lying();

        let result = runner.run(&mut job, Stage::Extraction, &logic, &ctx, &store).await;
        assert!(!result.success);
        assert_eq!(logic.calls(), 1);
        let error = result.error.unwrap();
        assert_eq!(error.kind(), FailureKind::ArtifactVerification);
        assert_ne!(
            store.load("job_run").unwrap().record(Stage::Extraction).status,
            StageStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_records_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (mut job, store, ctx, runner) = setup(dir.path(), 3);
        ctx.cancel.cancel();
        let logic = FlakyExtraction::new(0, io_error);

        let result = runner.run(&mut job, Stage::Extraction, &logic, &ctx, &store).await;
        assert_eq!(result.error.unwrap().kind(), FailureKind::Cancelled);
        assert_eq!(logic.calls(), 0);
        assert_eq!(
            store.load("job_run").unwrap().record(Stage::Extraction).status,
            StageStatus::Failed
        );
    }
}
