//! Apply Retry Policy
//!
//! Bounded exponential backoff with jitter for sink update retries.
//! Dropping an update silently would lose data permanently, so a failed
//! apply is retried a few times before the batch is deferred to the next
//! cycle.

use std::time::Duration;

use rand::Rng;

/// Configuration for apply retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier between attempts.
    pub multiplier: f64,
    /// Jitter fraction applied to each delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum retries per batch before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
            max_attempts,
        }
    }
}

/// Retry policy tracking attempts for one batch.
///
/// # Example
///
/// ```rust
/// use quote_feed::application::retry::{RetryConfig, RetryPolicy};
///
/// let mut policy = RetryPolicy::new(RetryConfig::default());
/// let delay = policy.next_delay();
/// assert!(delay.is_some());
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt_count: u32,
}

impl RetryPolicy {
    /// Create a new policy from configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay to sleep before the next retry, or `None` when the
    /// attempt budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        let delay = self.delay_for_attempt(self.attempt_count);
        self.attempt_count += 1;
        Some(self.apply_jitter(delay))
    }

    /// Reset the policy for a new batch.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Retries performed so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Undithered delay for the given zero-based attempt index.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let base = self.config.initial_delay.as_millis() as f64;
        let scaled = base * self.config.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        #[allow(clippy::cast_precision_loss)]
        let capped = scaled.min(self.config.max_delay.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Duration::from_millis(capped as u64)
        } else {
            self.config.max_delay
        }
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}
