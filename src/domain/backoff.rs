//! Backoff Policies - Retry and Reconnect Delays
//!
//! Two policies are used across the crawler:
//! - `ExponentialBackoff`: per-attempt delay for bounded HTTP retries,
//!   doubling from `min` with random jitter, capped at `max`.
//! - `ReconnectBackoff`: stateful delay between WebSocket reconnects,
//!   growing by a fixed factor up to a ceiling and reset on success.

use std::time::Duration;

use rand::Rng;

/// Stateless exponential delay with jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (without jitter).
    pub min: Duration,
    /// Upper bound for any delay, jitter included.
    pub max: Duration,
    /// Largest random amount added to each delay.
    pub max_jitter: Duration,
}

impl ExponentialBackoff {
    pub const fn new(min: Duration, max: Duration, max_jitter: Duration) -> Self {
        Self {
            min,
            max,
            max_jitter,
        }
    }

    /// Delay after failed attempt number `attempt` (zero-based), with jitter drawn.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic core of [`Self::delay`].
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let base = self.min.saturating_mul(factor);
        base.saturating_add(jitter.min(self.max_jitter)).min(self.max)
    }
}

/// Growing reconnect delay: `initial`, then ×`factor` per failure, up to `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            factor: factor.max(1.0),
            current: initial,
        }
    }

    /// Return the delay to wait now and grow the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.factor).min(self.max);
        delay
    }

    /// The delay the next failure will wait, without advancing.
    pub const fn peek(&self) -> Duration {
        self.current
    }

    /// Back to `initial` after a successful (re)subscription.
    pub const fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(60), 1.5)
    }
}
