use std::time::Duration;

use rand::Rng;

/// Bounded retry schedule for retryable submission failures.
///
/// Backoff grows geometrically from `initial_backoff` up to `max_backoff`.
/// With `jitter` enabled each delay is drawn uniformly from `[0, delay]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
            max_backoff: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Total attempts allowed, never less than one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Upper bound of the delay after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Delay to sleep before the next attempt.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }
}

/// Tunables for a `SessionRuntime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub retry: RetryPolicy,
    /// Countdown granularity. One second outside of tests.
    pub tick_period: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tick_period: Duration::from_secs(1),
        }
    }
}

impl RuntimeSettings {
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
