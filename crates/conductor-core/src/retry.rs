//! Retry policy: bounded exponential backoff for dispatch attempts.

use std::time::Duration;

/// Backoff curve for dispatch retries.
///
/// delay(n) = base_delay * multiplier^(n - 1), capped at max_delay.
/// With the defaults (2s, x2.0, cap 60s): 2s, 4s, 8s, 16s, ...
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Zero delays; keeps retry-exhaustion tests fast and deterministic.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs).min(self.max_delay)
    }
}
