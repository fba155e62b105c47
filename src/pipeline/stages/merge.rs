//! Merge: chunks → `final/narration.wav`, the timeline, and optionally MP3.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::{encode_mp3, merge_chunks, wav, AudioChunk, MergeError, MergeOptions};
use crate::config::ExportFormat;
use crate::pipeline::error::PipelineError;
use crate::pipeline::verify::load_manifest;
use crate::pipeline::workspace::write_json_atomic;

use super::{StageContext, StageLogic};

/// `final/narration.json`: where each segment sits in the merged audio.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub entries: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub voice: String,
    pub start_secs: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Default)]
pub struct MergeStage;

impl MergeStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageLogic for MergeStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let manifest = load_manifest(&ctx.workspace)
            .map_err(|e| PipelineError::InvalidInput(format!("segments manifest {e}")))?;
        let paths: Vec<(usize, PathBuf)> = manifest
            .segments
            .iter()
            .map(|s| (s.index, ctx.workspace.chunk(s.index)))
            .collect();
        let options = MergeOptions::from_config(&ctx.config.audio);
        let wav_path = ctx.workspace.final_wav();

        let work = {
            let wav_path = wav_path.clone();
            tokio::task::spawn_blocking(move || {
                let chunks = paths
                    .iter()
                    .map(|(index, path)| wav::read_chunk(path, *index))
                    .collect::<Result<Vec<AudioChunk>, _>>()?;
                let merged = merge_chunks(chunks, &options)?;
                wav::write_wav(&wav_path, &merged.samples, merged.sample_rate)?;
                let duration = merged.duration_secs();
                Ok::<_, MergeError>((merged.spans, merged.sample_rate, duration))
            })
        };
        let (spans, sample_rate, duration_secs) = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = work => joined??,
        };

        let entries = spans
            .into_iter()
            .zip(&manifest.segments)
            .map(|(span, segment)| TimelineEntry {
                index: span.index,
                voice: segment.voice.clone(),
                start_secs: span.start_secs,
                duration_secs: span.duration_secs,
            })
            .collect::<Vec<_>>();
        log::info!(
            "merge: {} chunks → {} ({duration_secs:.1}s)",
            entries.len(),
            wav_path.display()
        );
        let timeline = Timeline {
            sample_rate,
            duration_secs,
            entries,
        };
        write_json_atomic(&ctx.workspace.timeline(), &timeline)?;

        if ctx.config.audio.export_formats.contains(&ExportFormat::Mp3) {
            let audio = &ctx.config.audio;
            let mp3 = ctx.workspace.final_mp3();
            let timeout = Duration::from_secs(audio.encode_timeout_secs);
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
                result = encode_mp3(&audio.ffmpeg_command, &wav_path, &mp3, timeout) => result?,
            }
            log::info!("merge: exported {}", mp3.display());
        }
        Ok(())
    }
}
