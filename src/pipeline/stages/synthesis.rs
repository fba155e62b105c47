//! Synthesis: manifest → one `voices/chunk-NNNN.wav` per segment.
//!
//! Segments are dispatched to the [`SynthesisGateway`] by a bounded pool of
//! workers.  Completion order does not matter: each chunk is written under
//! its segment index.  A chunk that already exists and reads back as a valid
//! WAV file is not synthesised again, so a retried or resumed stage only
//! pays for what is missing.
//!
//! The first segment that fails cancels the remaining work; the stage then
//! reports that failure and the runner decides whether to retry.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::audio::wav;
use crate::pipeline::error::PipelineError;
use crate::pipeline::verify::{chunk_is_valid, load_manifest};
use crate::synthesis::{SynthesisError, SynthesisGateway};
use crate::voice::{TextSegment, VoiceIdentity};

use super::{StageContext, StageLogic};

#[derive(Default)]
pub struct SynthesisStage {
    gateway: Option<Arc<SynthesisGateway>>,
}

impl SynthesisStage {
    /// Builds the gateway from the job configuration on every run.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(gateway: Arc<SynthesisGateway>) -> Self {
        Self {
            gateway: Some(gateway),
        }
    }
}

#[async_trait]
impl StageLogic for SynthesisStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let manifest = load_manifest(&ctx.workspace)
            .map_err(|e| PipelineError::InvalidInput(format!("segments manifest {e}")))?;

        let mut pending: Vec<(TextSegment, VoiceIdentity)> = Vec::new();
        for segment in &manifest.segments {
            if chunk_is_valid(&ctx.workspace.chunk(segment.index)) {
                continue;
            }
            let voice = manifest.voice_for(segment).cloned().ok_or_else(|| {
                PipelineError::InvalidInput(format!("segment {} has no voice", segment.index))
            })?;
            pending.push((segment.clone(), voice));
        }

        let total = manifest.segments.len();
        let reused = total - pending.len();
        if pending.is_empty() {
            log::info!("synthesis: all {total} chunks already present");
            return Ok(());
        }
        if reused > 0 {
            log::info!("synthesis: reusing {reused}/{total} chunks from a previous attempt");
        }

        let gateway = match &self.gateway {
            Some(g) => Arc::clone(g),
            None => Arc::new(SynthesisGateway::from_config(
                &ctx.config.synthesis,
                &ctx.config.audio,
            )),
        };
        if gateway.is_empty() {
            return Err(SynthesisError::NoProviders.into());
        }

        let workers = ctx.config.synthesis.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let cancel = ctx.cancel.child_token();
        let mut tasks: JoinSet<Result<usize, PipelineError>> = JoinSet::new();

        for (segment, voice) in pending {
            let gateway = Arc::clone(&gateway);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            let path = ctx.workspace.chunk(segment.index);
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    permit = permits.acquire_owned() => permit
                        .map_err(|e| PipelineError::Internal(e.to_string()))?,
                };
                let chunk = gateway.synthesize(&segment, &voice, &cancel).await?;
                let index = chunk.index;
                tokio::task::spawn_blocking(move || wav::write_chunk(&path, &chunk))
                    .await?
                    .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
                Ok(index)
            });
        }

        let mut done = reused;
        let mut first_error: Option<PipelineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(PipelineError::from).and_then(|r| r) {
                Ok(index) => {
                    done += 1;
                    log::debug!("synthesis: chunk {index} written ({done}/{total})");
                }
                Err(e) => {
                    if first_error.is_none() {
                        log::warn!("synthesis: {e}; stopping remaining segments");
                        cancel.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(e) = first_error {
            log::info!("synthesis: {done}/{total} chunks kept for the next attempt");
            return Err(e);
        }
        log::info!("synthesis: {total} chunks ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use crate::audio::AudioQuality;
    use crate::config::AppConfig;
    use crate::pipeline::workspace::{write_json_atomic, Workspace};
    use crate::synthesis::mock::ScriptedProvider;
    use crate::synthesis::{ProviderError, ProviderKind, SpeechProvider};
    use crate::voice::{SegmentManifest, Tone, VoiceCategory};
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn manifest(n: usize) -> SegmentManifest {
        let mut m = SegmentManifest::default();
        m.voices.insert(
            "narrator".into(),
            VoiceIdentity {
                key: "narrator".into(),
                category: VoiceCategory::Narrator,
                reference: PathBuf::from("narrator.wav"),
            },
        );
        for index in 0..n {
            m.segments.push(TextSegment {
                index,
                text: format!("Line {index}."),
                voice: "narrator".into(),
                speed: 1.0,
                tone: Tone::Neutral,
            });
        }
        m
    }

    fn context(dir: &std::path::Path, segments: usize) -> StageContext {
        let workspace = Workspace::new(dir.join("job_test"));
        write_json_atomic(&workspace.manifest(), &manifest(segments)).unwrap();
        StageContext {
            job_id: "job_test".into(),
            source: dir.join("book.txt"),
            workspace,
            config: Arc::new(AppConfig::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn gateway(providers: &[Arc<ScriptedProvider>]) -> Arc<SynthesisGateway> {
        let mut g = SynthesisGateway::new(2, AudioQuality::default());
        for p in providers {
            g = g.with_provider(Arc::clone(p) as Arc<dyn SpeechProvider>, Duration::from_secs(5));
        }
        Arc::new(g)
    }

    #[tokio::test]
    async fn writes_one_chunk_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 5);
        let cloud = Arc::new(ScriptedProvider::ok("cloud", ProviderKind::Cloud));

        SynthesisStage::with_gateway(gateway(&[Arc::clone(&cloud)]))
            .run(&ctx)
            .await
            .unwrap();

        for index in 0..5 {
            let chunk: AudioChunk = wav::read_chunk(&ctx.workspace.chunk(index), index).unwrap();
            let expected = ScriptedProvider::amplitude_for(index);
            assert!((chunk.peak() - expected).abs() < 1e-3, "chunk {index}");
        }
        assert_eq!(cloud.calls(), 5);
    }

    #[tokio::test]
    async fn existing_chunks_are_not_resynthesised() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 4);
        wav::write_wav(&ctx.workspace.chunk(0), &[0.2; 2400], 24_000).unwrap();
        wav::write_wav(&ctx.workspace.chunk(2), &[0.2; 2400], 24_000).unwrap();
        std::fs::write(ctx.workspace.chunk(3), b"half a file").unwrap();
        let local = Arc::new(ScriptedProvider::ok("local", ProviderKind::Local));

        SynthesisStage::with_gateway(gateway(&[Arc::clone(&local)]))
            .run(&ctx)
            .await
            .unwrap();

        let mut served = local.served();
        served.sort_unstable();
        assert_eq!(served, vec![1, 3]);
    }

    #[tokio::test]
    async fn failed_segment_fails_the_stage_and_keeps_finished_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 3);
        let local = Arc::new(ScriptedProvider::failing_indices(
            "local",
            ProviderKind::Local,
            &[1],
            ProviderError::Unavailable("engine crashed".into()),
        ));

        let err = SynthesisStage::with_gateway(gateway(&[Arc::clone(&local)]))
            .run(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(SynthesisError::Exhausted { index: 1, .. })));
        assert!(err.is_retryable());
        assert!(!ctx.workspace.chunk(1).exists());
    }

    #[tokio::test]
    async fn empty_gateway_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 1);
        let err = SynthesisStage::with_gateway(gateway(&[]))
            .run(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(SynthesisError::NoProviders)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), 4);
        let slow = Arc::new(
            ScriptedProvider::ok("local", ProviderKind::Local).with_delay(Duration::from_secs(30)),
        );
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = SynthesisStage::with_gateway(gateway(&[slow]))
            .run(&ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::pipeline::error::FailureKind::Cancelled);
    }
}
