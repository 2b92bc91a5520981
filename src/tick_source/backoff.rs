// =============================================================================
// Backoff — exponential retry delay with jitter
// =============================================================================
//
// Used by tick sources whose upstream is down. Attempts are unlimited: a
// background source keeps retrying until the upstream answers again, then
// resets.
// =============================================================================

use std::time::Duration;

use rand::Rng;

use crate::runtime_config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = Duration::from_millis(config.initial_ms.max(1));
        Self {
            initial,
            max: Duration::from_millis(config.max_ms.max(config.initial_ms.max(1))),
            multiplier: if config.multiplier.is_finite() && config.multiplier >= 1.0 {
                config.multiplier
            } else {
                1.0
            },
            jitter_factor: config.jitter_factor.clamp(0.0, 1.0),
            current: initial,
            attempts: 0,
        }
    }

    /// Delay before the next retry; grows the following one.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.apply_jitter(self.current);
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    /// Back to the initial delay after a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let range = base_ms * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-range..=range);
        Duration::from_millis((base_ms + jitter).max(1.0) as u64)
    }
}
