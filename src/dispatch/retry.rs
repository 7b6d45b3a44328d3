//! Exponential backoff for retryable model failures.

use crate::config::DispatchSettings;
use crate::error::AskvidError;
use rand::Rng;
use std::time::Duration;

/// How many times, and how long apart, a failed request is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&DispatchSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms.max(1)),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }

    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry`, with up to one base delay of
    /// jitter. A longer server-requested delay takes precedence.
    pub fn delay_for(&self, retry: u32, err: &AskvidError) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=base_ms));
        let delay = (self.backoff(retry) + jitter).min(self.max_delay);

        match err.retry_after() {
            Some(requested) if requested > delay => requested,
            _ => delay,
        }
    }
}
