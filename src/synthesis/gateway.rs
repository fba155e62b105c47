//! Provider fallback, scheduling and resource release.
//!
//! # Policy
//!
//! ```text
//! segment ──► provider[0] ──ok──► quality check ──ok──► AudioChunk
//!                 │ any provider error / bad audio
//!                 ▼
//!             provider[1] ──► ...
//!                 │ all failed
//!                 ▼
//!         SynthesisError::Rejected   (every provider refused the request)
//!         SynthesisError::Exhausted  (otherwise)
//! ```
//!
//! * `Local` providers share one permit: at most one local call runs at a
//!   time, however many workers are ready.
//! * Each `Cloud` provider has its own permit pool of
//!   `cloud.max_concurrency`.
//! * After every local call, successful or not, the provider's `release`
//!   runs while the permit is still held.
//! * Every call is bounded by the provider's timeout and observes the job's
//!   cancellation token.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, AudioQuality};
use crate::config::{AudioConfig, ProviderPreference, SynthesisConfig};
use crate::synthesis::cloud::CloudSpeechProvider;
use crate::synthesis::local::CommandSpeechProvider;
use crate::synthesis::provider::{ProviderError, ProviderKind, SpeechProvider, SynthesisRequest};
use crate::voice::{TextSegment, VoiceIdentity};

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// One provider's failure, kept for the terminal error report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn describe(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal outcome of a gateway call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("all providers failed for segment {index}: {}", describe(.failures))]
    Exhausted {
        index: usize,
        failures: Vec<ProviderFailure>,
    },

    /// Every provider refused the request; retrying will not help.
    #[error("segment {index} rejected by every provider: {}", describe(.failures))]
    Rejected {
        index: usize,
        failures: Vec<ProviderFailure>,
    },

    #[error("no synthesis provider is enabled")]
    NoProviders,

    #[error("synthesis cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

struct Slot {
    provider: Arc<dyn SpeechProvider>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

/// Holds a local provider's permit until `release` has run.  If the call is
/// dropped mid-flight the release is finished on a background task.
struct ReleaseGuard {
    provider: Option<Arc<dyn SpeechProvider>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ReleaseGuard {
    fn new(provider: Arc<dyn SpeechProvider>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            provider: Some(provider),
            permit: Some(permit),
        }
    }

    async fn release(mut self) {
        if let Some(provider) = self.provider.take() {
            release_logged(provider.as_ref()).await;
        }
        self.permit.take();
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        let permit = self.permit.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                release_logged(provider.as_ref()).await;
                drop(permit);
            });
        }
    }
}

async fn release_logged(provider: &dyn SpeechProvider) {
    if let Err(e) = provider.release().await {
        log::warn!("synthesis: release of {} failed: {e}", provider.name());
    }
}

enum Attempt {
    Done(Result<AudioChunk, ProviderError>),
    Cancelled,
}

// ---------------------------------------------------------------------------
// SynthesisGateway
// ---------------------------------------------------------------------------

/// Turns a segment into audio using the configured providers in order.
pub struct SynthesisGateway {
    slots: Vec<Slot>,
    local_permits: Arc<Semaphore>,
    cloud_concurrency: usize,
    quality: AudioQuality,
}

impl SynthesisGateway {
    /// An empty gateway; add providers with [`with_provider`](Self::with_provider).
    pub fn new(cloud_concurrency: usize, quality: AudioQuality) -> Self {
        Self {
            slots: Vec::new(),
            local_permits: Arc::new(Semaphore::new(1)),
            cloud_concurrency: cloud_concurrency.max(1),
            quality,
        }
    }

    /// Append `provider` to the fallback order.
    pub fn with_provider(mut self, provider: Arc<dyn SpeechProvider>, timeout: Duration) -> Self {
        let permits = match provider.kind() {
            ProviderKind::Local => Arc::clone(&self.local_permits),
            ProviderKind::Cloud => Arc::new(Semaphore::new(self.cloud_concurrency)),
        };
        self.slots.push(Slot {
            provider,
            permits,
            timeout,
        });
        self
    }

    /// Build the production gateway.
    ///
    /// | Preference | Order |
    /// |------------|-------|
    /// | `auto` | cloud (when enabled and a token is set), then local |
    /// | `cloud` | cloud only |
    /// | `local` | local only |
    pub fn from_config(synthesis: &SynthesisConfig, audio: &AudioConfig) -> Self {
        let cloud_timeout = Duration::from_secs(synthesis.cloud.timeout_secs);
        let local_timeout = Duration::from_secs(synthesis.local.timeout_secs);
        let cloud: Arc<dyn SpeechProvider> =
            Arc::new(CloudSpeechProvider::from_config(&synthesis.cloud));
        let local: Arc<dyn SpeechProvider> =
            Arc::new(CommandSpeechProvider::from_config(&synthesis.local));

        let has_token = synthesis
            .cloud
            .api_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());

        let gateway = Self::new(
            synthesis.cloud.max_concurrency,
            AudioQuality::from_config(audio),
        );
        let gateway = match synthesis.provider {
            ProviderPreference::Auto => {
                let mut g = gateway;
                if synthesis.cloud.enabled && has_token {
                    g = g.with_provider(cloud, cloud_timeout);
                }
                if synthesis.local.enabled {
                    g = g.with_provider(local, local_timeout);
                }
                g
            }
            ProviderPreference::Cloud => gateway.with_provider(cloud, cloud_timeout),
            ProviderPreference::Local => gateway.with_provider(local, local_timeout),
        };
        log::info!(
            "synthesis: provider order [{}]",
            gateway.provider_names().join(", ")
        );
        gateway
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.provider.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Synthesise `segment` with `voice`, trying providers in configured order.
    pub async fn synthesize(
        &self,
        segment: &TextSegment,
        voice: &VoiceIdentity,
        cancel: &CancellationToken,
    ) -> Result<AudioChunk, SynthesisError> {
        self.synthesize_with(segment, voice, None, cancel).await
    }

    /// Like [`synthesize`](Self::synthesize), but providers of `preferred`
    /// kind are tried first.  The rest of the order is unchanged.
    pub async fn synthesize_with(
        &self,
        segment: &TextSegment,
        voice: &VoiceIdentity,
        preferred: Option<ProviderKind>,
        cancel: &CancellationToken,
    ) -> Result<AudioChunk, SynthesisError> {
        if self.slots.is_empty() {
            return Err(SynthesisError::NoProviders);
        }
        let request = SynthesisRequest::new(segment, voice);

        let mut order: Vec<&Slot> = self.slots.iter().collect();
        if let Some(kind) = preferred {
            order.sort_by_key(|s| s.provider.kind() != kind);
        }

        let mut failures = Vec::new();
        for slot in order {
            let name = slot.provider.name().to_string();
            let result = match self.attempt(slot, &request, cancel).await {
                Attempt::Cancelled => return Err(SynthesisError::Cancelled),
                Attempt::Done(result) => result,
            };
            let error = match result {
                Ok(chunk) => {
                    if !failures.is_empty() {
                        log::info!(
                            "synthesis: segment {} produced by fallback provider {name}",
                            request.index
                        );
                    }
                    return Ok(chunk);
                }
                Err(error) => error,
            };

            let failure = ProviderFailure {
                provider: name,
                error,
            };
            log::warn!(
                "synthesis: segment {} {failure}; trying next provider",
                request.index
            );
            failures.push(failure);
        }

        if failures.iter().all(|f| f.error.is_rejection()) {
            log::error!(
                "synthesis: segment {} refused by every provider",
                request.index
            );
            return Err(SynthesisError::Rejected {
                index: request.index,
                failures,
            });
        }
        Err(SynthesisError::Exhausted {
            index: request.index,
            failures,
        })
    }

    async fn attempt(
        &self,
        slot: &Slot,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> Attempt {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Attempt::Cancelled,
            permit = Arc::clone(&slot.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    return Attempt::Done(Err(ProviderError::Unavailable(
                        "provider permits closed".into(),
                    )))
                }
            },
        };

        let (guard, _cloud_permit) = match slot.provider.kind() {
            ProviderKind::Local => (
                Some(ReleaseGuard::new(Arc::clone(&slot.provider), permit)),
                None,
            ),
            ProviderKind::Cloud => (None, Some(permit)),
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Attempt::Cancelled,
            result = tokio::time::timeout(slot.timeout, slot.provider.synthesize(request)) => {
                match result {
                    Ok(Ok(chunk)) => Attempt::Done(self.accept(request, chunk)),
                    Ok(Err(e)) => Attempt::Done(Err(e)),
                    Err(_) => Attempt::Done(Err(ProviderError::Timeout {
                        secs: slot.timeout.as_secs(),
                    })),
                }
            }
        };

        if let Some(guard) = guard {
            guard.release().await;
        }
        outcome
    }

    fn accept(
        &self,
        request: &SynthesisRequest,
        mut chunk: AudioChunk,
    ) -> Result<AudioChunk, ProviderError> {
        chunk.index = request.index;
        self.quality
            .validate(&chunk)
            .map_err(|e| ProviderError::InvalidAudio(e.to_string()))?;
        Ok(chunk)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
