//! Optional language-model refinement of paragraphs before voice
//! assignment.
//!
//! This module provides:
//! * [`Advisor`] — async trait implemented by all advisor backends.
//! * [`ApiAdvisor`] — OpenAI-compatible REST API advisor.
//! * [`NoopAdvisor`] — returns text unchanged (the default).
//! * [`FallbackAdvisor`] — wraps any advisor with timeout, retry and
//!   degrade-to-input behaviour.
//! * [`PromptBuilder`] — builds refinement prompts.
//!
//! The pipeline never depends on an advisor answer for control flow.

pub mod client;
pub mod fallback;
pub mod prompt;

use std::sync::Arc;

pub use client::{Advisor, AdvisorError, ApiAdvisor, NoopAdvisor};
pub use fallback::FallbackAdvisor;
pub use prompt::PromptBuilder;

use crate::config::AdvisorConfig;

/// Advisor selected by configuration: a fallback-wrapped API advisor when
/// enabled, otherwise [`NoopAdvisor`].
pub fn from_config(config: &AdvisorConfig) -> Arc<dyn Advisor> {
    if config.enabled {
        log::info!("advisor: enabled ({} at {})", config.model, config.base_url);
        Arc::new(FallbackAdvisor::from_config(ApiAdvisor::from_config(config), config))
    } else {
        Arc::new(NoopAdvisor)
    }
}
