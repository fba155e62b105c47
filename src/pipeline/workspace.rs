//! Job-scoped artifact layout.
//!
//! ```text
//! <output_dir>/<job_id>/
//! ├── job.json
//! ├── extracted/document.txt
//! ├── staged/segments.json
//! ├── voices/chunk-0000.wav ...
//! ├── final/narration.wav
//! ├── final/narration.mp3        (optional)
//! ├── final/narration.json
//! └── cleanup.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::pipeline::error::PipelineError;

pub const STATE_FILE: &str = "job.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace of `job_id` under `output_dir`.
    pub fn for_job(output_dir: &Path, job_id: &str) -> Self {
        Self::new(output_dir.join(job_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn extracted_text(&self) -> PathBuf {
        self.root.join("extracted").join("document.txt")
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("staged").join("segments.json")
    }

    pub fn voices_dir(&self) -> PathBuf {
        self.root.join("voices")
    }

    pub fn chunk(&self, index: usize) -> PathBuf {
        self.voices_dir().join(format!("chunk-{index:04}.wav"))
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    pub fn final_wav(&self) -> PathBuf {
        self.final_dir().join("narration.wav")
    }

    pub fn final_mp3(&self) -> PathBuf {
        self.final_dir().join("narration.mp3")
    }

    pub fn timeline(&self) -> PathBuf {
        self.final_dir().join("narration.json")
    }

    pub fn cleanup_report(&self) -> PathBuf {
        self.root.join("cleanup.json")
    }

    /// `path` relative to the workspace root; unchanged when outside it.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Inverse of [`relative`](Self::relative).
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Replace `path` with `bytes` via a temporary sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Pretty-print `value` as JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)?;
    Ok(())
}
