//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient provider errors (rate limits,
//! timeouts, 5xx) are retried with increasing delays. For a local provider,
//! use [`BackoffConfig::none()`]. For cloud APIs, use
//! [`BackoffConfig::standard()`] or tune to your rate limit tier.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
///
/// `max_attempts` is the total provider-call budget, including the first
/// attempt: with `max_attempts = 3`, a call that fails transiently three
/// times is terminal even if a fourth would have succeeded.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total call attempts. Minimum 1. Default: 1 (no retry).
    pub max_attempts: u32,

    /// Delay before the second attempt. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry. Default: 2.0.
    pub multiplier: f64,

    /// Cap on the delay between attempts. Default: 60 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// Whether to honor `Retry-After` delays reported by the provider.
    /// Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy to prevent thundering herd on shared rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,

    /// Full jitter: random value in `[0, calculated_delay]`.
    Full,

    /// Equal jitter: `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// Single attempt, no retry. For local providers or when the caller
    /// handles errors itself.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::standard()
        }
    }

    /// Sensible defaults for cloud APIs: 3 attempts, 1s initial, 2x
    /// multiplier, 60s cap, full jitter, respects Retry-After.
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            respect_retry_after: true,
        }
    }

    /// Patient retry for unattended batch processing: 5 attempts,
    /// 500ms initial, 120s cap.
    pub fn batch() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(120),
            jitter: JitterStrategy::Full,
            respect_retry_after: true,
        }
    }

    /// Calculate the delay before retry N (0-indexed: retry 0 is the delay
    /// between the first and second attempts).
    ///
    /// The base delay is `initial_delay * multiplier^retry`, capped at
    /// `max_delay`, then jittered per the configured strategy.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}
