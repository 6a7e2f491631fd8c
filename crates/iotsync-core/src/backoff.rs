// ── Reconnect backoff ──
//
// Attempt counter + schedule for the connection manager. The counter is
// the only thing serializing reconnects: a new attempt is scheduled only
// after the previous one has finished.

use std::time::Duration;

use crate::config::ReconnectPolicy;

/// Exponential schedule: the delay before attempt `n` (1-based) is
/// `base_delay × 2^(n-1)`. No jitter, no cap other than `max_attempts`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Count the next attempt and return its delay, or `None` once the
    /// maximum has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(delay_for(self.policy.base_delay, self.attempts))
    }

    /// Back to zero (successful open, or explicit disconnect).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

fn delay_for(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exponent)
}
