//! Extraction: source document → `extracted/document.txt`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::pipeline::error::PipelineError;
use crate::pipeline::workspace::write_atomic;
use crate::text::{DocumentExtractor, ExtractionError, FileExtractor};

use super::{StageContext, StageLogic};

#[derive(Default)]
pub struct ExtractionStage {
    extractor: Option<Arc<dyn DocumentExtractor>>,
}

impl ExtractionStage {
    /// Uses a [`FileExtractor`] built from the job configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor(extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self {
            extractor: Some(extractor),
        }
    }
}

#[async_trait]
impl StageLogic for ExtractionStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let extractor: Arc<dyn DocumentExtractor> = match &self.extractor {
            Some(e) => Arc::clone(e),
            None => Arc::new(FileExtractor::new(&ctx.config.extraction)),
        };

        let text = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = extractor.extract(&ctx.source) => result?,
        };
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(ctx.source.clone()).into());
        }

        let path = ctx.workspace.extracted_text();
        write_atomic(&path, text.as_bytes())?;
        log::debug!("extraction: wrote {}", path.display());
        Ok(())
    }
}
