//! Core `Advisor` trait, `ApiAdvisor` and `NoopAdvisor`.
//!
//! `ApiAdvisor` calls any OpenAI-compatible `/v1/chat/completions` endpoint
//! (Ollama in OpenAI mode, OpenAI, Groq, LM Studio, vLLM).  All connection
//! details come from [`AdvisorConfig`].

use async_trait::async_trait;
use thiserror::Error;

use crate::advisor::prompt::PromptBuilder;
use crate::config::AdvisorConfig;

// ---------------------------------------------------------------------------
// AdvisorError
// ---------------------------------------------------------------------------

/// Errors from a reasoning call.
#[derive(Debug, Clone, Error)]
pub enum AdvisorError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The call did not complete within the configured timeout.
    #[error("advisor request timed out")]
    Timeout,

    /// The service answered 429 or a quota error.
    #[error("advisor quota exhausted: {0}")]
    Quota(String),

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse advisor response: {0}")]
    Parse(String),

    /// The model returned no usable text.
    #[error("advisor returned an empty response")]
    EmptyResponse,

    /// The answer was discarded by a sanity check.
    #[error("advisor answer rejected: {0}")]
    Rejected(String),
}

impl AdvisorError {
    /// Transient unavailability that is worth retrying after a backoff.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout | Self::Quota(_))
    }
}

impl From<reqwest::Error> for AdvisorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdvisorError::Timeout
        } else {
            AdvisorError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Advisor trait
// ---------------------------------------------------------------------------

/// Optional reasoning component that may rewrite one paragraph for
/// speakability.  Implementations must not be relied upon for control flow.
///
/// # Arguments
/// * `paragraph` – One paragraph of cleaned text.
/// * `context`   – Optional excerpt from the start of the document.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn refine(&self, paragraph: &str, context: Option<&str>)
        -> Result<String, AdvisorError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Advisor>) {}
};

// ---------------------------------------------------------------------------
// NoopAdvisor
// ---------------------------------------------------------------------------

/// Returns every paragraph unchanged.  Used when the advisor is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

#[async_trait]
impl Advisor for NoopAdvisor {
    async fn refine(&self, paragraph: &str, _context: Option<&str>) -> Result<String, AdvisorError> {
        Ok(paragraph.to_string())
    }
}

// ---------------------------------------------------------------------------
// ApiAdvisor
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ApiAdvisor {
    client: reqwest::Client,
    config: AdvisorConfig,
    prompt_builder: PromptBuilder,
}

impl ApiAdvisor {
    /// Build from config.  The HTTP client carries the per-request timeout
    /// from `config.timeout_secs`.
    pub fn from_config(config: &AdvisorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
            prompt_builder: PromptBuilder::new(),
        }
    }
}

#[async_trait]
impl Advisor for ApiAdvisor {
    /// The `Authorization: Bearer …` header is attached only when
    /// `config.api_key` is a non-empty string.
    async fn refine(&self, paragraph: &str, context: Option<&str>) -> Result<String, AdvisorError> {
        let (system_msg, user_msg) = self.prompt_builder.build_chat(paragraph, context);

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "system", "content": system_msg },
                { "role": "user",   "content": user_msg   }
            ],
            "stream":      false,
            "temperature": self.config.temperature
        });

        let mut req = self.client.post(&url).json(&body);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AdvisorError::Quota(status.to_string()));
        }
        if !status.is_success() {
            return Err(AdvisorError::Request(format!("HTTP {status}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AdvisorError::Parse(e.to_string()))?;

        let refined = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(AdvisorError::EmptyResponse)?
            .trim()
            .to_string();

        if refined.is_empty() {
            return Err(AdvisorError::EmptyResponse);
        }

        Ok(refined)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
