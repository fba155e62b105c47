//! Scripted speech provider for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioChunk;
use crate::synthesis::provider::{ProviderError, ProviderKind, SpeechProvider, SynthesisRequest};

pub const MOCK_SAMPLE_RATE: u32 = 24_000;

/// Returns a short tone per request, or a scripted error.
///
/// Each chunk's amplitude encodes its segment index (`0.1 + 0.01 * index`,
/// capped), so tests can check that merged audio keeps segment order.
pub struct ScriptedProvider {
    name: String,
    kind: ProviderKind,
    error: Option<ProviderError>,
    fail_first: usize,
    fail_indices: HashSet<usize>,
    delay: Duration,
    calls: AtomicUsize,
    releases: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    served: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    pub fn ok(name: &str, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            error: None,
            fail_first: 0,
            fail_indices: HashSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            served: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with `error`.
    pub fn failing(name: &str, kind: ProviderKind, error: ProviderError) -> Self {
        Self {
            error: Some(error),
            fail_first: usize::MAX,
            ..Self::ok(name, kind)
        }
    }

    /// Fails the first `n` calls with `error`, then succeeds.
    pub fn failing_first(name: &str, kind: ProviderKind, n: usize, error: ProviderError) -> Self {
        Self {
            error: Some(error),
            fail_first: n,
            ..Self::ok(name, kind)
        }
    }

    /// Fails only the listed segment indices with `error`.
    pub fn failing_indices(
        name: &str,
        kind: ProviderKind,
        indices: &[usize],
        error: ProviderError,
    ) -> Self {
        Self {
            error: Some(error),
            fail_indices: indices.iter().copied().collect(),
            ..Self::ok(name, kind)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Segment indices this provider produced audio for.
    pub fn served(&self) -> Vec<usize> {
        self.served.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn amplitude_for(index: usize) -> f32 {
        (0.1 + 0.01 * index as f32).min(0.5)
    }
}

#[async_trait]
impl SpeechProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunk, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            if call < self.fail_first || self.fail_indices.contains(&request.index) {
                return Err(error.clone());
            }
        }

        if let Ok(mut served) = self.served.lock() {
            served.push(request.index);
        }
        let samples = vec![Self::amplitude_for(request.index); (MOCK_SAMPLE_RATE / 10) as usize];
        Ok(AudioChunk::new(request.index, samples, MOCK_SAMPLE_RATE))
    }

    async fn release(&self) -> Result<(), ProviderError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
