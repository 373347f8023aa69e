//! Central retry policy
//!
//! One table keyed by the classification's retry-strategy tag. The
//! coordinator is the only consumer; stages never retry on their own.

use insightflow_model::RetryStrategy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable retry parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries beyond the initial attempt, per stage
    pub max_stage_retries: u32,
    /// First backoff delay
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl RetryConfig {
    /// With retry cap
    #[inline]
    #[must_use]
    pub fn with_max_stage_retries(mut self, max: u32) -> Self {
        self.max_stage_retries = max;
        self
    }

    /// With base delay
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// With delay ceiling
    #[inline]
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_stage_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Resolved policy for one classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether another attempt is allowed at all
    pub retry_allowed: bool,
    /// Delay before the next attempt; `None` means retry immediately
    pub backoff: bool,
    /// Whether the attempt is preceded by the one-shot deterministic fix
    pub fix_first: bool,
}

/// The policy table
#[must_use]
pub fn policy_for(strategy: RetryStrategy) -> RetryPolicy {
    match strategy {
        RetryStrategy::None => RetryPolicy {
            retry_allowed: false,
            backoff: false,
            fix_first: false,
        },
        RetryStrategy::Immediate => RetryPolicy {
            retry_allowed: true,
            backoff: false,
            fix_first: false,
        },
        RetryStrategy::Backoff => RetryPolicy {
            retry_allowed: true,
            backoff: true,
            fix_first: false,
        },
        RetryStrategy::FixThenRetry => RetryPolicy {
            retry_allowed: true,
            backoff: false,
            fix_first: true,
        },
    }
}

/// Exponential backoff with jitter for the given retry number (1-based)
///
/// Jitter spreads concurrent retries; the result never exceeds
/// `config.max_delay`.
#[must_use]
pub fn backoff_delay(config: &RetryConfig, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(1u64 << exp);
    let capped_ms = raw_ms.min(config.max_delay.as_millis() as u64);
    let jitter_ms = if capped_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=capped_ms / 2)
    };
    Duration::from_millis(capped_ms + jitter_ms).min(config.max_delay)
}
