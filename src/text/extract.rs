//! Source document extraction.
//!
//! [`DocumentExtractor`] is the seam the extraction stage depends on.
//! [`FileExtractor`] reads plain-text formats directly and shells out to
//! `pdftotext` for PDF files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::ExtractionConfig;

// ---------------------------------------------------------------------------
// ExtractionError
// ---------------------------------------------------------------------------

/// Failures while turning a source document into text.  None of these are
/// retried: a document that cannot be read now will not be readable on the
/// next attempt either.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("source document not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("document is not valid UTF-8: {0}")]
    InvalidEncoding(PathBuf),

    #[error("no text could be extracted from {0}")]
    Empty(PathBuf),

    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    #[error("{tool} timed out after {secs} s")]
    Timeout { tool: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// DocumentExtractor trait
// ---------------------------------------------------------------------------

/// Turns a document on disk into raw text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, source: &Path) -> Result<String, ExtractionError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn DocumentExtractor>) {}
};

// ---------------------------------------------------------------------------
// FileExtractor
// ---------------------------------------------------------------------------

/// Supported source kinds, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    PlainText,
    Pdf,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Result<Self, ExtractionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" | "text" => Ok(Self::PlainText),
            "pdf" => Ok(Self::Pdf),
            "" => Err(ExtractionError::UnsupportedFormat("<no extension>".into())),
            other => Err(ExtractionError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Production extractor for `.txt`, `.md` and `.pdf` sources.
pub struct FileExtractor {
    pdftotext: String,
    timeout: Duration,
}

impl FileExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            pdftotext: config.pdftotext_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn read_plain(&self, source: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(source).await?;
        String::from_utf8(bytes).map_err(|_| ExtractionError::InvalidEncoding(source.to_path_buf()))
    }

    async fn read_pdf(&self, source: &Path) -> Result<String, ExtractionError> {
        let mut command = Command::new(&self.pdftotext);
        command
            .arg("-enc")
            .arg("UTF-8")
            .arg(source)
            .arg("-")
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| ExtractionError::ToolFailed {
                tool: self.pdftotext.clone(),
                detail: e.to_string(),
            })?,
            Err(_) => {
                return Err(ExtractionError::Timeout {
                    tool: self.pdftotext.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(ExtractionError::ToolFailed {
                tool: self.pdftotext.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ExtractionError::InvalidEncoding(source.to_path_buf()))
    }
}

#[async_trait]
impl DocumentExtractor for FileExtractor {
    async fn extract(&self, source: &Path) -> Result<String, ExtractionError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(ExtractionError::NotFound(source.to_path_buf()));
        }
        let kind = SourceKind::detect(source)?;
        let text = match kind {
            SourceKind::PlainText => self.read_plain(source).await?,
            SourceKind::Pdf => self.read_pdf(source).await?,
        };
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(source.to_path_buf()));
        }
        log::info!(
            "extraction: read {} chars from {}",
            text.chars().count(),
            source.display()
        );
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn extractor() -> FileExtractor {
        FileExtractor::new(&ExtractionConfig::default())
    }

    #[test]
    fn detects_kind_by_extension() {
        assert_eq!(
            SourceKind::detect(Path::new("book.TXT")).unwrap(),
            SourceKind::PlainText
        );
        assert_eq!(SourceKind::detect(Path::new("a.pdf")).unwrap(), SourceKind::Pdf);
        assert!(matches!(
            SourceKind::detect(Path::new("a.epub")),
            Err(ExtractionError::UnsupportedFormat(ext)) if ext == "epub"
        ));
    }

    #[tokio::test]
    async fn reads_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("story.txt");
        std::fs::write(&path, "Once upon a time.").unwrap();

        let text = extractor().extract(&path).await.unwrap();
        assert_eq!(text, "Once upon a time.");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = extractor()
            .extract(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound(_)));
    }

    #[tokio::test]
    async fn whitespace_only_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.md");
        std::fs::write(&path, "  \n\n ").unwrap();

        let err = extractor().extract(&path).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Empty(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let err = extractor().extract(&path).await.unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidEncoding(_)));
    }

    #[tokio::test]
    async fn missing_pdf_tool_fails_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let extractor = FileExtractor::new(&ExtractionConfig {
            pdftotext_command: "definitely-not-a-real-pdftotext".into(),
            timeout_secs: 5,
        });
        let err = extractor.extract(&path).await.unwrap_err();
        assert!(matches!(err, ExtractionError::ToolFailed { .. }));
    }
}
