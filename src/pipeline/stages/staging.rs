//! Staging: extracted text → cleaned text → voice-tagged segments manifest.
//!
//! ```text
//! document.txt ─▶ clean_text ─▶ [advisor per paragraph] ─▶ VoiceAssigner ─▶ segments.json
//! ```
//!
//! The advisor is optional enrichment.  Any advisor error keeps the
//! paragraph as it was; the manifest is always produced from heuristics.

use std::sync::Arc;

use async_trait::async_trait;

use crate::advisor::{self, Advisor};
use crate::advisor::prompt::CONTEXT_EXCERPT_CHARS;
use crate::pipeline::error::PipelineError;
use crate::pipeline::workspace::write_json_atomic;
use crate::text::clean_text;
use crate::voice::sentence::split_paragraphs;
use crate::voice::{VoiceAssigner, VoiceOverrides};

use super::{StageContext, StageLogic};

pub struct StagingStage {
    overrides: VoiceOverrides,
    advisor: Option<Arc<dyn Advisor>>,
}

impl StagingStage {
    /// `overrides` is the user's override table; inline
    /// `[voices.characters]` entries from the job configuration win over it.
    pub fn new(overrides: VoiceOverrides) -> Self {
        Self {
            overrides,
            advisor: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    async fn refine(
        &self,
        ctx: &StageContext,
        advisor: &dyn Advisor,
        cleaned: &str,
    ) -> Result<String, PipelineError> {
        let context: String = cleaned.chars().take(CONTEXT_EXCERPT_CHARS).collect();
        let paragraphs = split_paragraphs(cleaned);
        let mut refined = Vec::with_capacity(paragraphs.len());
        let mut changed = 0usize;

        for paragraph in paragraphs {
            let answer = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
                answer = advisor.refine(&paragraph, Some(&context)) => answer,
            };
            match answer {
                Ok(text) if !text.trim().is_empty() => {
                    if text != paragraph {
                        changed += 1;
                    }
                    refined.push(text.trim().to_string());
                }
                Ok(_) => refined.push(paragraph),
                Err(e) => {
                    log::warn!("staging: {}; keeping paragraph", PipelineError::from(e));
                    refined.push(paragraph);
                }
            }
        }
        log::info!("staging: advisor rewrote {changed}/{} paragraphs", refined.len());
        Ok(refined.join("\n\n"))
    }
}

#[async_trait]
impl StageLogic for StagingStage {
    async fn run(&self, ctx: &StageContext) -> Result<(), PipelineError> {
        let raw = tokio::fs::read_to_string(ctx.workspace.extracted_text()).await?;
        let mut text = clean_text(&raw);
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "no narratable text left after cleaning".into(),
            ));
        }

        let advisor = self.advisor.clone().or_else(|| {
            ctx.config
                .advisor
                .enabled
                .then(|| advisor::from_config(&ctx.config.advisor))
        });
        if let Some(advisor) = advisor {
            text = self.refine(ctx, advisor.as_ref(), &text).await?;
        }

        let assigner = VoiceAssigner::from_config(&ctx.config, self.overrides.clone());
        let manifest = assigner.assign(&text);
        manifest.validate().map_err(PipelineError::InvalidInput)?;

        log::info!(
            "staging: {} segments (max {} chars), voices {:?}",
            manifest.segments.len(),
            assigner.max_segment_chars(),
            manifest.voice_summary()
        );
        write_json_atomic(&ctx.workspace.manifest(), &manifest)
    }
}
