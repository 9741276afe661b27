//! Reconnect backoff.
//!
//! The delay before reconnect attempt `n` (1-based) is
//! `min(base * 2^(n-1), max)`. There is no jitter: clients reconnect on a
//! fixed schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for chat reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts after an unexpected close before giving up.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Hard cap on a single delay.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max_delay = Duration::from_millis(self.max_delay_ms);
        // Attempts >= 33 saturate instead of overflowing the shift.
        let multiplier = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        Duration::from_millis(self.base_delay_ms)
            .checked_mul(multiplier)
            .unwrap_or(max_delay)
            .min(max_delay)
    }

    /// Whether a reconnect numbered `attempt` is still allowed.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }
}
