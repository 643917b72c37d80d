use rand::Rng;
use std::time::Duration;

/// Exponential retry delay for queued submissions:
/// `min(base * 2^attempts, max)` plus uniform jitter in `[0, jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 600_000,
            jitter_ms: 2_000,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic part of the delay after `attempts` failed deliveries.
    pub fn capped_delay_ms(&self, attempts: u32) -> u64 {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.capped_delay_ms(attempts).saturating_add(jitter))
    }

    /// Upper bound of [`delay`](Self::delay) for any attempt count.
    pub fn max_total_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.saturating_add(self.jitter_ms))
    }
}
