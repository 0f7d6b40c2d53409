//! Backoff between failing monitor ticks.

use std::time::Duration;

use rand::Rng;

/// Tracks consecutive tick failures and the pause each one earns.
///
/// The n-th failure in a row waits `base * 2^(n-1)`, capped at `max`,
/// plus up to 10% jitter. A success starts the sequence over.
#[derive(Debug, Clone)]
pub struct TickBackoff {
    base_ms: u64,
    max_ms: u64,
    failures: u32,
}

impl TickBackoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            failures: 0,
        }
    }

    /// Count a failure and return how long to pause before the next tick.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current_delay()
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Swap in reloaded limits. The failure count carries over.
    pub fn set_limits(&mut self, base_ms: u64, max_ms: u64) {
        self.base_ms = base_ms;
        self.max_ms = max_ms;
    }

    fn current_delay(&self) -> Duration {
        if self.failures == 0 {
            return Duration::ZERO;
        }
        let capped = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(self.failures - 1))
            .min(self.max_ms);
        let jitter = match capped / 10 {
            0 => 0,
            range => rand::thread_rng().gen_range(0..range),
        };
        Duration::from_millis(capped + jitter)
    }
}
