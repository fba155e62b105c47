//! Fallback advisor: wraps any [`Advisor`] and degrades to the input text.
//!
//! Each call runs under a timeout.  Transient unavailability (transport
//! errors, timeouts, quota) is retried with exponential backoff up to
//! `max_attempts`; any other failure, or exhausting the attempts, returns the
//! paragraph unchanged.  An answer that drops more than half of the
//! paragraph is discarded.

use std::time::Duration;

use async_trait::async_trait;

use crate::advisor::client::{Advisor, AdvisorError};
use crate::config::AdvisorConfig;

/// A transparent wrapper around any [`Advisor`] that never returns an error.
///
/// # Example
/// ```rust
/// use narrator::advisor::{ApiAdvisor, FallbackAdvisor};
/// use narrator::config::AdvisorConfig;
///
/// let config = AdvisorConfig::default();
/// let advisor = FallbackAdvisor::from_config(ApiAdvisor::from_config(&config), &config);
/// ```
pub struct FallbackAdvisor<A: Advisor> {
    inner: A,
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
}

impl<A: Advisor> FallbackAdvisor<A> {
    pub fn new(inner: A, timeout: Duration, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(inner: A, config: &AdvisorConfig) -> Self {
        Self::new(
            inner,
            Duration::from_secs(config.timeout_secs),
            config.max_attempts,
            Duration::from_millis(500),
        )
    }

    /// Return a reference to the wrapped advisor.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    async fn call_once(
        &self,
        paragraph: &str,
        context: Option<&str>,
    ) -> Result<String, AdvisorError> {
        let call = self.inner.refine(paragraph, context);
        let refined = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => return Err(AdvisorError::Timeout),
        };
        let kept = refined.chars().count();
        let original = paragraph.chars().count();
        if kept * 2 < original {
            return Err(AdvisorError::Rejected(format!(
                "answer kept {kept} of {original} chars"
            )));
        }
        Ok(refined)
    }

    /// Refine `paragraph`, or return it unchanged if the advisor cannot help.
    pub async fn refine_or_keep(&self, paragraph: &str, context: Option<&str>) -> String {
        for attempt in 1..=self.max_attempts {
            match self.call_once(paragraph, context).await {
                Ok(refined) => return refined,
                Err(err) if err.is_unavailable() && attempt < self.max_attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    log::warn!(
                        "advisor: attempt {attempt}/{} unavailable ({err}); retrying in {delay:?}",
                        self.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    log::warn!(
                        "advisor: {err}; keeping original paragraph (len={})",
                        paragraph.len()
                    );
                    return paragraph.to_string();
                }
            }
        }
        paragraph.to_string()
    }
}

#[async_trait]
impl<A: Advisor> Advisor for FallbackAdvisor<A> {
    /// This implementation never returns `Err(_)`.
    async fn refine(&self, paragraph: &str, context: Option<&str>) -> Result<String, AdvisorError> {
        Ok(self.refine_or_keep(paragraph, context).await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
