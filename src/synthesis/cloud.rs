//! HTTP speech provider for a hosted voice-cloning service.
//!
//! Sends one JSON request per segment:
//!
//! ```json
//! { "text": "...", "voice": "Alice", "reference": "female.wav",
//!   "language": "en", "speed": 1.0, "tone": "neutral" }
//! ```
//!
//! The service answers either with WAV bytes directly or with
//! `{"output": "<url>"}` pointing at the rendered file, which is then
//! downloaded.  Status codes map onto [`ProviderError`]:
//!
//! | Status | Error |
//! |--------|-------|
//! | 401, 403 | `Auth` |
//! | 429 | `Quota` |
//! | 5xx | `Unavailable` |
//! | other 4xx | `Rejected` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::audio::{wav, AudioChunk};
use crate::config::{CloudConfig, CLOUD_TOKEN_ENV};
use crate::synthesis::provider::{ProviderError, ProviderKind, SpeechProvider, SynthesisRequest};

pub struct CloudSpeechProvider {
    client: reqwest::Client,
    config: CloudConfig,
}

impl CloudSpeechProvider {
    pub fn from_config(config: &CloudConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config: config.clone(),
        }
    }

    fn token(&self) -> Result<&str, ProviderError> {
        match self.config.api_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ProviderError::Auth(format!(
                "no API token configured (set {CLOUD_TOKEN_ENV})"
            ))),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                secs: self.config.timeout_secs,
            }
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    async fn fetch_output(&self, url: &str, token: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "downloading rendered audio"));
        }
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy.
pub fn classify_status(status: StatusCode, detail: &str) -> ProviderError {
    let message = format!("HTTP {status}: {detail}");
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::Quota(message),
        500..=599 => ProviderError::Unavailable(message),
        _ => ProviderError::Rejected(message),
    }
}

#[async_trait]
impl SpeechProvider for CloudSpeechProvider {
    fn name(&self) -> &str {
        "cloud"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunk, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::Unavailable("cloud provider disabled".into()));
        }
        let token = self.token()?;

        let reference = request
            .reference
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = serde_json::json!({
            "text":      request.text,
            "voice":     request.voice,
            "reference": reference,
            "language":  self.config.language,
            "speed":     request.speed,
            "tone":      request.tone.as_str(),
        });

        log::debug!(
            "synthesis: cloud request for segment {} ({} chars, voice={})",
            request.index,
            request.text.len(),
            request.voice
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail.trim()));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        let bytes = if is_json {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidAudio(e.to_string()))?;
            let url = json["output"]
                .as_str()
                .ok_or_else(|| ProviderError::InvalidAudio("response has no output URL".into()))?;
            self.fetch_output(url, token).await?
        } else {
            response
                .bytes()
                .await
                .map_err(|e| self.transport_error(e))?
                .to_vec()
        };

        wav::decode_bytes(&bytes, request.index)
            .map_err(|e| ProviderError::InvalidAudio(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
