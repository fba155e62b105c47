//! Pipeline orchestrator: drives one job through the fixed stage sequence.
//!
//! [`PipelineOrchestrator`] owns the immutable configuration and the
//! job-scoped cancellation token.  Each call to [`generate`] or [`resume`]
//! takes the job's lock, loads or creates its record, and runs every stage
//! that has not already succeeded through the [`StageRunner`].
//!
//! # Job flow
//!
//! ```text
//! generate ─▶ create job.json ─┐
//!                              ├─▶ status = running
//! resume ─▶ load job.json ─────┘     │
//!   └─ verify succeeded stages       ▼
//!      (missing artifact ⇒       for stage in [extraction, staging, synthesis, merge, cleanup]:
//!       state corruption)            ├─ succeeded? ─▶ skip
//!                                    └─ StageRunner::run
//!                                         ├─ ok  ─▶ next stage
//!                                         └─ err ─▶ status = failed, stop
//!                                    status = completed
//! ```
//!
//! [`generate`]: PipelineOrchestrator::generate
//! [`resume`]: PipelineOrchestrator::resume

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ExportFormat};
use crate::pipeline::error::{FailureKind, PipelineError};
use crate::pipeline::lock::JobLock;
use crate::pipeline::runner::{RetryPolicy, StageRunner};
use crate::pipeline::stage::{Stage, StageStatus};
use crate::pipeline::stages::{
    CleanupStage, ExtractionStage, MergeStage, StageContext, StageLogic, StagingStage,
    SynthesisStage,
};
use crate::pipeline::state::{new_job_id, Job, JobFailure, JobOptions, JobStatus, JobStore};
use crate::pipeline::verify::verify_stage;
use crate::voice::VoiceOverrides;

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// What a caller gets back from `generate` or `resume`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    /// Absolute path of the exported narration when completed.
    pub final_artifact: Option<PathBuf>,
    pub error: Option<JobFailure>,
    /// Stages run by this call.  A resumed job reports only these.
    pub executed_stages: Vec<Stage>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Drives jobs from source document to exported narration.
///
/// ```rust,no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use narrator::config::AppConfig;
/// use narrator::pipeline::{JobOptions, PipelineOrchestrator};
/// use narrator::voice::VoiceOverrides;
///
/// # async fn example() -> Result<(), narrator::pipeline::PipelineError> {
/// let config = Arc::new(AppConfig::default());
/// let options = JobOptions::from_config(&config);
/// let orchestrator = PipelineOrchestrator::new(config, VoiceOverrides::default());
/// let result = orchestrator
///     .generate(Path::new("book.txt"), Path::new("jobs"), options)
///     .await?;
/// println!("{:?}", result.final_artifact);
/// # Ok(())
/// # }
/// ```
pub struct PipelineOrchestrator {
    config: Arc<AppConfig>,
    overrides: VoiceOverrides,
    logic: HashMap<Stage, Arc<dyn StageLogic>>,
    cancel: CancellationToken,
}

impl PipelineOrchestrator {
    pub fn new(config: Arc<AppConfig>, overrides: VoiceOverrides) -> Self {
        Self {
            config,
            overrides,
            logic: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the logic used for `stage`.
    pub fn with_stage_logic(mut self, stage: Stage, logic: Arc<dyn StageLogic>) -> Self {
        self.logic.insert(stage, logic);
        self
    }

    /// Use `cancel` as the job cancellation signal.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn stage_logic(&self, stage: Stage) -> Arc<dyn StageLogic> {
        if let Some(logic) = self.logic.get(&stage) {
            return Arc::clone(logic);
        }
        match stage {
            Stage::Extraction => Arc::new(ExtractionStage::new()),
            Stage::Staging => Arc::new(StagingStage::new(self.overrides.clone())),
            Stage::Synthesis => Arc::new(SynthesisStage::new()),
            Stage::Merge => Arc::new(MergeStage::new()),
            Stage::Cleanup => Arc::new(CleanupStage::new()),
        }
    }

    /// Start a new job with a fresh identifier.
    pub async fn generate(
        &self,
        source: &Path,
        output_dir: &Path,
        options: JobOptions,
    ) -> Result<JobResult, PipelineError> {
        self.generate_with_id(&new_job_id(), source, output_dir, options)
            .await
    }

    /// Start a new job under `job_id`.  Fails if the job already exists.
    pub async fn generate_with_id(
        &self,
        job_id: &str,
        source: &Path,
        output_dir: &Path,
        options: JobOptions,
    ) -> Result<JobResult, PipelineError> {
        validate_job_id(job_id)?;
        let _lock = JobLock::try_acquire(job_id)?;
        let store = JobStore::new(output_dir);
        let job = Job::new(job_id, source, options);
        store.create(&job)?;
        log::info!(
            "pipeline: created {job_id} for {} in {}",
            source.display(),
            store.workspace(job_id).root().display()
        );
        self.drive(job, &store).await
    }

    /// Continue a job from its first unfinished stage.
    ///
    /// Every stage recorded as succeeded must still have valid artifacts;
    /// otherwise the job is marked failed and `StateCorruption` is returned.
    pub async fn resume(&self, output_dir: &Path, job_id: &str) -> Result<JobResult, PipelineError> {
        validate_job_id(job_id)?;
        let _lock = JobLock::try_acquire(job_id)?;
        let store = JobStore::new(output_dir);
        let mut job = store.load(job_id)?;
        let config = job.options.apply(&self.config);
        let workspace = store.workspace(job_id);

        if job.status == JobStatus::Completed {
            return match check_succeeded(&job, &workspace, &config) {
                Ok(()) => {
                    log::info!("pipeline: {job_id} already completed");
                    Ok(JobResult {
                        job_id: job.job_id.clone(),
                        status: JobStatus::Completed,
                        final_artifact: job.final_artifact.as_deref().map(|p| workspace.resolve(p)),
                        error: None,
                        executed_stages: Vec::new(),
                    })
                }
                Err((stage, detail)) => Err(mark_corrupt(&mut job, &store, stage, detail)),
            };
        }

        if let Err((stage, detail)) = check_succeeded(&job, &workspace, &config) {
            return Err(mark_corrupt(&mut job, &store, stage, detail));
        }

        let mut rerun_from_here = false;
        for record in &mut job.stages {
            record.reset_interrupted();
            if record.status != StageStatus::Succeeded {
                rerun_from_here = true;
            } else if rerun_from_here {
                log::warn!(
                    "pipeline: {job_id} {} follows an unfinished stage; running it again",
                    record.name
                );
                record.requeue();
            }
        }
        log::info!(
            "pipeline: resuming {job_id} at {}",
            job.next_stage().map_or("completion", Stage::name)
        );
        self.drive(job, &store).await
    }

    async fn drive(&self, mut job: Job, store: &JobStore) -> Result<JobResult, PipelineError> {
        let config = Arc::new(job.options.apply(&self.config));
        let runner = StageRunner::new(RetryPolicy::new(config.retry.clone()));
        let ctx = StageContext {
            job_id: job.job_id.clone(),
            source: job.source.clone(),
            workspace: store.workspace(&job.job_id),
            config: Arc::clone(&config),
            cancel: self.cancel.clone(),
        };

        job.status = JobStatus::Running;
        job.failure = None;
        job.touch();
        store.save(&job)?;

        let mut executed = Vec::new();
        for stage in Stage::ALL {
            if job.record(stage).status == StageStatus::Succeeded {
                log::debug!("pipeline: {} {stage} already succeeded", job.job_id);
                continue;
            }
            let logic = self.stage_logic(stage);
            let result = runner
                .run(&mut job, stage, logic.as_ref(), &ctx, store)
                .await;
            executed.push(stage);

            if !result.success {
                let error = result
                    .error
                    .unwrap_or_else(|| PipelineError::Internal("stage failed without error".into()));
                let failure = JobFailure {
                    stage,
                    attempts: result.attempts,
                    kind: error.kind(),
                    cause: error.to_string(),
                };
                log::error!("pipeline: {} failed: {failure}", job.job_id);
                job.status = JobStatus::Failed;
                job.failure = Some(failure.clone());
                job.touch();
                if let Err(e) = store.save(&job) {
                    log::error!("pipeline: {} could not persist failure: {e}", job.job_id);
                }
                return Ok(JobResult {
                    job_id: job.job_id,
                    status: JobStatus::Failed,
                    final_artifact: None,
                    error: Some(failure),
                    executed_stages: executed,
                });
            }
        }

        let final_path = final_artifact(&ctx, &config);
        job.final_artifact = Some(ctx.workspace.relative(&final_path));
        job.status = JobStatus::Completed;
        job.touch();
        store.save(&job)?;
        log::info!(
            "pipeline: {} completed → {}",
            job.job_id,
            final_path.display()
        );

        Ok(JobResult {
            job_id: job.job_id,
            status: JobStatus::Completed,
            final_artifact: Some(final_path),
            error: None,
            executed_stages: executed,
        })
    }
}

/// MP3 when exported, otherwise the WAV master.
fn final_artifact(ctx: &StageContext, config: &AppConfig) -> PathBuf {
    if config.audio.export_formats.contains(&ExportFormat::Mp3) {
        ctx.workspace.final_mp3()
    } else {
        ctx.workspace.final_wav()
    }
}

fn validate_job_id(job_id: &str) -> Result<(), PipelineError> {
    let valid = !job_id.is_empty()
        && job_id != "."
        && job_id != ".."
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!("invalid job id {job_id:?}")))
    }
}

/// Re-verify every stage recorded as succeeded.
///
/// Synthesis chunks are consumed by cleanup, so a missing chunk is tolerated
/// once merge has succeeded and its outputs verify.
fn check_succeeded(
    job: &Job,
    workspace: &crate::pipeline::workspace::Workspace,
    config: &AppConfig,
) -> Result<(), (Stage, String)> {
    let merge_verified = job.record(Stage::Merge).status == StageStatus::Succeeded
        && verify_stage(Stage::Merge, workspace, config).is_ok();

    for record in &job.stages {
        if record.status != StageStatus::Succeeded {
            continue;
        }
        match verify_stage(record.name, workspace, config) {
            Ok(_) => {}
            Err(_) if record.name == Stage::Synthesis && merge_verified => {
                log::debug!("pipeline: {} chunks already consumed by merge", job.job_id);
            }
            Err(e) => return Err((record.name, e.to_string())),
        }
    }
    Ok(())
}

fn mark_corrupt(job: &mut Job, store: &JobStore, stage: Stage, detail: String) -> PipelineError {
    let detail = format!("{stage} is recorded as succeeded but {detail}");
    log::error!("pipeline: {} state corruption: {detail}", job.job_id);
    job.status = JobStatus::Failed;
    job.failure = Some(JobFailure {
        stage,
        attempts: job.record(stage).attempts,
        kind: FailureKind::StateCorruption,
        cause: detail.clone(),
    });
    job.touch();
    if let Err(e) = store.save(job) {
        log::error!("pipeline: {} could not persist failure: {e}", job.job_id);
    }
    PipelineError::StateCorruption {
        job_id: job.job_id.clone(),
        detail,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioQuality;
    use crate::config::RetryConfig;
    use crate::pipeline::stages::Timeline;
    use crate::synthesis::mock::ScriptedProvider;
    use crate::synthesis::{ProviderError, ProviderKind, SpeechProvider, SynthesisGateway};
    use crate::voice::SegmentManifest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const BOOK: &str = "Alice said, \"I am leaving.\" Bob frowned.\n\n\
        \"Wait,\" Bob whispered. He reached for her hand.\n\n\
        The train pulled away from the station.";

    /// Counts calls before delegating.
    struct Counting {
        inner: Arc<dyn StageLogic>,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(inner: Arc<dyn StageLogic>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageLogic for Counting {
        async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.run(ctx).await
        }
    }

    /// Claims success without writing anything.
    struct Lying;

    #[async_trait]
    impl StageLogic for Lying {
        async fn run(&self, _: &StageContext) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        output: PathBuf,
        config: Arc<AppConfig>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("book.txt");
            std::fs::write(&source, BOOK).unwrap();
            let mut config = AppConfig::default();
            config.retry = RetryConfig {
                backoff_base_ms: 1,
                backoff_max_ms: 5,
                ..RetryConfig::default()
            };
            config.synthesis.workers = 2;
            Self {
                output: dir.path().join("jobs"),
                source,
                config: Arc::new(config),
                _dir: dir,
            }
        }

        fn options(&self) -> JobOptions {
            JobOptions::from_config(&self.config)
        }

        fn orchestrator(&self, providers: &[Arc<ScriptedProvider>]) -> PipelineOrchestrator {
            let mut gateway = SynthesisGateway::new(2, AudioQuality::default());
            for p in providers {
                gateway = gateway
                    .with_provider(Arc::clone(p) as Arc<dyn SpeechProvider>, Duration::from_secs(5));
            }
            PipelineOrchestrator::new(Arc::clone(&self.config), VoiceOverrides::default())
                .with_stage_logic(
                    Stage::Synthesis,
                    Arc::new(SynthesisStage::with_gateway(Arc::new(gateway))),
                )
        }

        fn store(&self) -> JobStore {
            JobStore::new(&self.output)
        }

        fn manifest(&self, job_id: &str) -> SegmentManifest {
            let path = self.store().workspace(job_id).manifest();
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
        }

        /// A job with extraction and staging done and synthesis failed.
        async fn failed_at_synthesis(&self, job_id: &str) -> JobResult {
            let rejecting = Arc::new(ScriptedProvider::failing(
                "cloud",
                ProviderKind::Cloud,
                ProviderError::Rejected("voice not allowed".into()),
            ));
            self.orchestrator(&[rejecting])
                .generate_with_id(job_id, &self.source, &self.output, self.options())
                .await
                .unwrap()
        }
    }

    fn local() -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider::ok("local", ProviderKind::Local))
    }

    #[tokio::test]
    async fn cloud_outage_falls_back_to_local_for_every_segment() {
        let fx = Fixture::new();
        let cloud = Arc::new(ScriptedProvider::failing(
            "cloud",
            ProviderKind::Cloud,
            ProviderError::Network("connection refused".into()),
        ));
        let local = local();

        let result = fx
            .orchestrator(&[Arc::clone(&cloud), Arc::clone(&local)])
            .generate_with_id("job_fallback", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();

        assert!(result.succeeded(), "{:?}", result.error);
        assert_eq!(result.executed_stages, Stage::ALL.to_vec());
        let final_wav = result.final_artifact.unwrap();
        assert!(final_wav.ends_with("final/narration.wav"));
        assert!(final_wav.exists());

        let segments = fx.manifest("job_fallback").segments.len();
        let mut served = local.served();
        served.sort_unstable();
        assert_eq!(served, (0..segments).collect::<Vec<_>>());
        assert_eq!(cloud.calls(), segments);
        assert_eq!(local.releases(), segments);

        let ws = fx.store().workspace("job_fallback");
        let timeline: Timeline =
            serde_json::from_slice(&std::fs::read(ws.timeline()).unwrap()).unwrap();
        let order: Vec<usize> = timeline.entries.iter().map(|e| e.index).collect();
        assert_eq!(order, (0..segments).collect::<Vec<_>>());
        assert!(!ws.voices_dir().exists());

        let job = fx.store().load("job_fallback").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.stages.iter().all(|r| r.status == StageStatus::Succeeded));
        assert_eq!(job.final_artifact, Some(PathBuf::from("final/narration.wav")));
    }

    #[tokio::test]
    async fn cloud_refusing_every_request_still_completes_from_local() {
        let fx = Fixture::new();
        let cloud = Arc::new(ScriptedProvider::failing(
            "cloud",
            ProviderKind::Cloud,
            ProviderError::Rejected("HTTP 404 Not Found".into()),
        ));
        let local = local();

        let result = fx
            .orchestrator(&[cloud, Arc::clone(&local)])
            .generate_with_id("job_refused", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();

        assert!(result.succeeded(), "{:?}", result.error);
        let segments = fx.manifest("job_refused").segments.len();
        let mut served = local.served();
        served.sort_unstable();
        assert_eq!(served, (0..segments).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failed_job_reports_stage_attempts_and_cause() {
        let fx = Fixture::new();
        let result = fx.failed_at_synthesis("job_failed").await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(
            result.executed_stages,
            vec![Stage::Extraction, Stage::Staging, Stage::Synthesis]
        );
        let failure = result.error.unwrap();
        assert_eq!(failure.stage, Stage::Synthesis);
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.kind, FailureKind::Synthesis);
        assert!(failure.cause.contains("voice not allowed"), "{}", failure.cause);

        let job = fx.store().load("job_failed").unwrap();
        let statuses: Vec<StageStatus> = job.stages.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StageStatus::Succeeded,
                StageStatus::Succeeded,
                StageStatus::Failed,
                StageStatus::Pending,
                StageStatus::Pending,
            ]
        );
        assert_eq!(job.failure, Some(failure));
    }

    #[tokio::test]
    async fn resume_runs_only_unfinished_stages() {
        let fx = Fixture::new();
        fx.failed_at_synthesis("job_resume").await;

        let extraction = Counting::new(Arc::new(ExtractionStage::new()));
        let staging = Counting::new(Arc::new(StagingStage::new(VoiceOverrides::default())));
        let orchestrator = fx
            .orchestrator(&[local()])
            .with_stage_logic(Stage::Extraction, extraction.clone())
            .with_stage_logic(Stage::Staging, staging.clone());

        let result = orchestrator.resume(&fx.output, "job_resume").await.unwrap();
        assert!(result.succeeded(), "{:?}", result.error);
        assert_eq!(
            result.executed_stages,
            vec![Stage::Synthesis, Stage::Merge, Stage::Cleanup]
        );
        assert_eq!(extraction.calls(), 0);
        assert_eq!(staging.calls(), 0);

        let job = fx.store().load("job_resume").unwrap();
        assert_eq!(job.record(Stage::Synthesis).attempts, 2);
        assert_eq!(job.record(Stage::Extraction).attempts, 1);
    }

    #[tokio::test]
    async fn resuming_a_completed_job_executes_nothing() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(&[local()]);
        orchestrator
            .generate_with_id("job_done", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();

        let again = orchestrator.resume(&fx.output, "job_done").await.unwrap();
        assert!(again.succeeded());
        assert!(again.executed_stages.is_empty());
        assert!(again.final_artifact.unwrap().exists());
    }

    #[tokio::test]
    async fn settings_edited_after_completion_do_not_break_resume() {
        let fx = Fixture::new();
        fx.orchestrator(&[local()])
            .generate_with_id("job_edited", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();

        let mut edited = (*fx.config).clone();
        edited.audio.export_formats = vec![ExportFormat::Wav, ExportFormat::Mp3];
        edited.audio.keep_intermediates = true;
        let again = PipelineOrchestrator::new(Arc::new(edited), VoiceOverrides::default())
            .resume(&fx.output, "job_edited")
            .await
            .unwrap();

        assert!(again.succeeded(), "{:?}", again.error);
        assert!(again.executed_stages.is_empty());
        assert_eq!(
            again.final_artifact,
            Some(fx.store().workspace("job_edited").final_wav())
        );
        let job = fx.store().load("job_edited").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.options.export_formats, vec![ExportFormat::Wav]);
    }

    #[tokio::test]
    async fn missing_artifact_of_succeeded_stage_is_state_corruption() {
        let fx = Fixture::new();
        fx.failed_at_synthesis("job_tampered").await;
        std::fs::remove_file(fx.store().workspace("job_tampered").extracted_text()).unwrap();

        let err = fx
            .orchestrator(&[local()])
            .resume(&fx.output, "job_tampered")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::StateCorruption);
        assert!(err.to_string().contains("extraction"), "{err}");

        let job = fx.store().load("job_tampered").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.unwrap().kind, FailureKind::StateCorruption);
        assert!(!fx.store().workspace("job_tampered").extracted_text().exists());
    }

    #[tokio::test]
    async fn completed_job_with_missing_output_is_state_corruption() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(&[local()]);
        orchestrator
            .generate_with_id("job_gone", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();
        std::fs::remove_file(fx.store().workspace("job_gone").final_wav()).unwrap();

        let err = orchestrator.resume(&fx.output, "job_gone").await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::StateCorruption);
    }

    #[tokio::test]
    async fn stage_claiming_success_without_artifact_fails_the_job() {
        let fx = Fixture::new();
        let result = fx
            .orchestrator(&[local()])
            .with_stage_logic(Stage::Extraction, Arc::new(Lying))
            .generate_with_id("job_lying", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        let failure = result.error.unwrap();
        assert_eq!(failure.stage, Stage::Extraction);
        assert_eq!(failure.kind, FailureKind::ArtifactVerification);
        let job = fx.store().load("job_lying").unwrap();
        assert_eq!(job.record(Stage::Extraction).status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn concurrent_advance_of_same_job_is_busy() {
        let fx = Fixture::new();
        let _held = JobLock::try_acquire("job_contended").unwrap();
        let err = fx
            .orchestrator(&[local()])
            .generate_with_id("job_contended", &fx.source, &fx.output, fx.options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::JobBusy);
        assert!(!fx.store().exists("job_contended"));
    }

    #[tokio::test]
    async fn existing_job_id_is_rejected() {
        let fx = Fixture::new();
        fx.failed_at_synthesis("job_twice").await;
        let err = fx
            .orchestrator(&[local()])
            .generate_with_id("job_twice", &fx.source, &fx.output, fx.options())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let fx = Fixture::new();
        let err = fx
            .orchestrator(&[local()])
            .resume(&fx.output, "job_missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::JobNotFound);
    }

    #[tokio::test]
    async fn path_like_job_ids_are_invalid() {
        let fx = Fixture::new();
        for id in ["", "..", "a/b", "job x"] {
            let err = fx
                .orchestrator(&[local()])
                .generate_with_id(id, &fx.source, &fx.output, fx.options())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), FailureKind::InvalidInput, "{id:?}");
        }
    }

    #[tokio::test]
    async fn cancelled_job_fails_and_can_be_resumed() {
        let fx = Fixture::new();
        let orchestrator = fx.orchestrator(&[local()]);
        orchestrator.cancel_token().cancel();

        let result = orchestrator
            .generate_with_id("job_cancel", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.error.unwrap().kind, FailureKind::Cancelled);

        let resumed = fx
            .orchestrator(&[local()])
            .resume(&fx.output, "job_cancel")
            .await
            .unwrap();
        assert!(resumed.succeeded(), "{:?}", resumed.error);
        assert_eq!(resumed.executed_stages, Stage::ALL.to_vec());
    }

    #[tokio::test]
    async fn interrupted_stage_is_run_again() {
        let fx = Fixture::new();
        fx.failed_at_synthesis("job_crash").await;
        let store = fx.store();
        let mut job = store.load("job_crash").unwrap();
        job.status = JobStatus::Running;
        job.record_mut(Stage::Synthesis).begin_attempt();
        store.save(&job).unwrap();

        let result = fx
            .orchestrator(&[local()])
            .resume(&fx.output, "job_crash")
            .await
            .unwrap();
        assert!(result.succeeded(), "{:?}", result.error);
        assert_eq!(result.executed_stages[0], Stage::Synthesis);

        let job = store.load("job_crash").unwrap();
        let history = &job.record(Stage::Synthesis).history;
        assert_eq!(history[1].error.as_deref(), Some("interrupted"));
    }

    #[tokio::test]
    async fn retried_synthesis_reuses_finished_chunks() {
        let fx = Fixture::new();
        // Fails the first call of the job's first attempt, succeeds after.
        let flaky = Arc::new(ScriptedProvider::failing_first(
            "local",
            ProviderKind::Local,
            1,
            ProviderError::Unavailable("warming up".into()),
        ));

        let result = fx
            .orchestrator(&[Arc::clone(&flaky)])
            .generate_with_id("job_retry", &fx.source, &fx.output, fx.options())
            .await
            .unwrap();
        assert!(result.succeeded(), "{:?}", result.error);

        let segments = fx.manifest("job_retry").segments.len();
        let job = fx.store().load("job_retry").unwrap();
        assert_eq!(job.record(Stage::Synthesis).attempts, 2);
        assert_eq!(job.record(Stage::Synthesis).history[0].outcome, StageStatus::Failed);
        let mut served = flaky.served();
        served.sort_unstable();
        served.dedup();
        assert_eq!(served, (0..segments).collect::<Vec<_>>());
    }
}
