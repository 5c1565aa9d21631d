//! Reconnect delay policy.
//!
//! Capped exponential backoff with proportional jitter:
//!
//! ```text
//! nominal(n) = min(initial * multiplier^n, max)
//! delay(n)   = nominal(n) * (1 ± jitter)        (clamped to max)
//! ```
//!
//! The attempt counter resets once a connection is established, so a session
//! that drops after a long healthy period reconnects quickly.

use std::time::Duration;

use rand::Rng;

use crate::core::constants::{
    DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX,
    DEFAULT_BACKOFF_MULTIPLIER,
};

/// Reconnect delay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Fraction of each delay that is randomised (0.0..=1.0).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl BackoffConfig {
    /// Retry immediately after every drop, with no delay at all.
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Set the first delay.
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Set the delay cap.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Tracks consecutive failures and produces the next delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Start with no failures recorded.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay before the `attempt`-th retry, without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let multiplier = finite_or(self.config.multiplier, 1.0).max(1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.config.initial.as_secs_f64() * multiplier.powi(exponent);
        self.capped(scaled)
    }

    /// Record a failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = finite_or(self.config.jitter, 0.0).clamp(0.0, 1.0);
        if jitter == 0.0 || nominal.is_zero() {
            return nominal;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        self.capped(nominal.as_secs_f64() * factor)
    }

    // Seconds beyond what `Duration` holds saturate at `max`.
    fn capped(&self, seconds: f64) -> Duration {
        Duration::try_from_secs_f64(seconds.max(0.0))
            .map_or(self.config.max, |delay| delay.min(self.config.max))
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
