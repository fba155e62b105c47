//! Independent re-reading of stage artifacts.
//!
//! A stage is marked succeeded only after its outputs are read back from
//! disk and pass the checks below.  The same checks gate `resume`.
//!
//! | Stage | Artifact | Check |
//! |-------|----------|-------|
//! | Extraction | `extracted/document.txt` | UTF-8, not blank |
//! | Staging | `staged/segments.json` | parses, validates |
//! | Synthesis | `voices/chunk-NNNN.wav` | one readable WAV per segment |
//! | Merge | `final/narration.{wav,json[,mp3]}` | WAV readable, timeline covers every segment |
//! | Cleanup | `cleanup.json` | parses, `voices/` gone unless kept |

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::audio::wav;
use crate::config::{AppConfig, ExportFormat};
use crate::pipeline::error::PipelineError;
use crate::pipeline::stage::Stage;
use crate::pipeline::stages::cleanup::CleanupReport;
use crate::pipeline::stages::merge::Timeline;
use crate::pipeline::workspace::Workspace;
use crate::voice::SegmentManifest;

/// One artifact that failed its check.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{path}: {reason}")]
pub struct ArtifactError {
    pub path: PathBuf,
    pub reason: String,
}

impl ArtifactError {
    fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn into_pipeline(self, stage: Stage) -> PipelineError {
        PipelineError::ArtifactVerification {
            stage,
            path: self.path,
            reason: self.reason,
        }
    }
}

/// Verify the outputs of `stage` and return their workspace-relative paths.
pub fn verify_stage(
    stage: Stage,
    workspace: &Workspace,
    config: &AppConfig,
) -> Result<Vec<PathBuf>, ArtifactError> {
    let outputs = match stage {
        Stage::Extraction => vec![verify_text(&workspace.extracted_text())?],
        Stage::Staging => {
            load_manifest(workspace)?;
            vec![workspace.manifest()]
        }
        Stage::Synthesis => {
            let manifest = load_manifest(workspace)?;
            let mut chunks = Vec::with_capacity(manifest.segments.len());
            for segment in &manifest.segments {
                let path = workspace.chunk(segment.index);
                verify_wav(&path)?;
                chunks.push(path);
            }
            chunks
        }
        Stage::Merge => verify_merge(workspace, config)?,
        Stage::Cleanup => vec![verify_cleanup(workspace, config)?],
    };
    log::debug!("verify: {stage} ok ({} artifact(s))", outputs.len());
    Ok(outputs.iter().map(|p| workspace.relative(p)).collect())
}

/// Whether the chunk at `path` is a structurally valid WAV file.
pub fn chunk_is_valid(path: &Path) -> bool {
    verify_wav(path).is_ok()
}

/// Read and validate the segments manifest.
pub fn load_manifest(workspace: &Workspace) -> Result<SegmentManifest, ArtifactError> {
    let path = workspace.manifest();
    let manifest: SegmentManifest = read_json(&path)?;
    manifest
        .validate()
        .map_err(|reason| ArtifactError::new(&path, reason))?;
    Ok(manifest)
}

fn verify_text(path: &Path) -> Result<PathBuf, ArtifactError> {
    let bytes = read(path)?;
    let text = std::str::from_utf8(&bytes).map_err(|_| ArtifactError::new(path, "not UTF-8"))?;
    if text.trim().is_empty() {
        return Err(ArtifactError::new(path, "empty"));
    }
    Ok(path.to_path_buf())
}

fn verify_wav(path: &Path) -> Result<(), ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::new(path, "missing"));
    }
    wav::inspect(path)
        .map(|_| ())
        .map_err(|e| ArtifactError::new(path, e.to_string()))
}

fn verify_merge(workspace: &Workspace, config: &AppConfig) -> Result<Vec<PathBuf>, ArtifactError> {
    let wav_path = workspace.final_wav();
    verify_wav(&wav_path)?;

    let timeline_path = workspace.timeline();
    let timeline: Timeline = read_json(&timeline_path)?;
    let manifest = load_manifest(workspace)?;
    if timeline.entries.len() != manifest.segments.len() {
        return Err(ArtifactError::new(
            &timeline_path,
            format!(
                "timeline has {} entries for {} segments",
                timeline.entries.len(),
                manifest.segments.len()
            ),
        ));
    }
    if let Some((pos, entry)) = timeline
        .entries
        .iter()
        .enumerate()
        .find(|(pos, e)| e.index != *pos)
    {
        return Err(ArtifactError::new(
            &timeline_path,
            format!("entry {pos} has index {}", entry.index),
        ));
    }

    let mut outputs = vec![wav_path, timeline_path];
    if config.audio.export_formats.contains(&ExportFormat::Mp3) {
        let mp3 = workspace.final_mp3();
        if read(&mp3)?.is_empty() {
            return Err(ArtifactError::new(&mp3, "empty"));
        }
        outputs.push(mp3);
    }
    Ok(outputs)
}

fn verify_cleanup(workspace: &Workspace, config: &AppConfig) -> Result<PathBuf, ArtifactError> {
    let path = workspace.cleanup_report();
    let _: CleanupReport = read_json(&path)?;
    let voices = workspace.voices_dir();
    if !config.audio.keep_intermediates && voices.exists() {
        return Err(ArtifactError::new(&voices, "intermediates were not removed"));
    }
    Ok(path)
}

fn read(path: &Path) -> Result<Vec<u8>, ArtifactError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ArtifactError::new(path, "missing"),
        _ => ArtifactError::new(path, e.to_string()),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::new(path, format!("unreadable: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workspace::{write_atomic, write_json_atomic};
    use crate::voice::{TextSegment, Tone, VoiceCategory, VoiceIdentity};

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
                text: format!("Sentence {index}."),
                voice: "narrator".into(),
                speed: 1.0,
                tone: Tone::Neutral,
            });
        }
        m
    }

    #[test]
    fn extraction_requires_non_blank_text() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let config = AppConfig::default();

        let err = verify_stage(Stage::Extraction, &ws, &config).unwrap_err();
        assert_eq!(err.reason, "missing");

        write_atomic(&ws.extracted_text(), b"  \n ").unwrap();
        assert_eq!(verify_stage(Stage::Extraction, &ws, &config).unwrap_err().reason, "empty");

        write_atomic(&ws.extracted_text(), b"Once upon a time.").unwrap();
        let outputs = verify_stage(Stage::Extraction, &ws, &config).unwrap();
        assert_eq!(outputs, vec![PathBuf::from("extracted/document.txt")]);
    }

    #[test]
    fn staging_rejects_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        write_json_atomic(&ws.manifest(), &SegmentManifest::default()).unwrap();

        let err = verify_stage(Stage::Staging, &ws, &AppConfig::default()).unwrap_err();
        assert!(err.reason.contains("no segments"), "{err}");
    }

    #[test]
    fn synthesis_needs_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        write_json_atomic(&ws.manifest(), &manifest(2)).unwrap();
        wav::write_wav(&ws.chunk(0), &[0.1; 100], 8_000).unwrap();

        let err = verify_stage(Stage::Synthesis, &ws, &AppConfig::default()).unwrap_err();
        assert_eq!(err.path, ws.chunk(1));

        std::fs::write(ws.chunk(1), b"not a wav").unwrap();
        assert!(verify_stage(Stage::Synthesis, &ws, &AppConfig::default()).is_err());
        assert!(!chunk_is_valid(&ws.chunk(1)));

        wav::write_wav(&ws.chunk(1), &[0.1; 100], 8_000).unwrap();
        let outputs = verify_stage(Stage::Synthesis, &ws, &AppConfig::default()).unwrap();
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn merge_checks_timeline_against_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        write_json_atomic(&ws.manifest(), &manifest(2)).unwrap();
        wav::write_wav(&ws.final_wav(), &[0.1; 100], 8_000).unwrap();
        write_json_atomic(&ws.timeline(), &Timeline::default()).unwrap();

        let err = verify_stage(Stage::Merge, &ws, &AppConfig::default()).unwrap_err();
        assert!(err.reason.contains("0 entries for 2 segments"), "{err}");
    }

    #[test]
    fn cleanup_requires_voices_removed() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        write_json_atomic(&ws.cleanup_report(), &CleanupReport::default()).unwrap();
        std::fs::create_dir_all(ws.voices_dir()).unwrap();

        let mut config = AppConfig::default();
        assert!(verify_stage(Stage::Cleanup, &ws, &config).is_err());
        config.audio.keep_intermediates = true;
        assert!(verify_stage(Stage::Cleanup, &ws, &config).is_ok());
    }

    #[test]
    fn converts_to_pipeline_error() {
        let err = ArtifactError::new(Path::new("final/narration.wav"), "missing")
            .into_pipeline(Stage::Merge);
        assert!(matches!(err, PipelineError::ArtifactVerification { stage: Stage::Merge, .. }));
    }
}
