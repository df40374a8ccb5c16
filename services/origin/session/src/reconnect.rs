//! Reconnect policy: exponential backoff with jitter and an attempt cap.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Lower bound of the jitter factor applied to each backoff
pub const JITTER_MIN: f64 = 0.8;

/// Upper bound of the jitter factor applied to each backoff
pub const JITTER_MAX: f64 = 1.2;

/// Tracks consecutive reconnect attempts for one client
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts since the last successful connect
    attempts: u32,
    /// Attempts allowed before automatic recovery gives up
    max_attempts: u32,
    /// Backoff before the first attempt
    backoff_base: Duration,
    /// Upper bound on the un-jittered backoff
    backoff_max: Duration,
}

impl ReconnectPolicy {
    /// Create a new reconnect policy
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    /// Claim the next attempt number, or `None` once the cap is reached
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.attempts >= self.max_attempts {
            warn!(
                "Reconnect attempts exhausted ({}/{})",
                self.attempts, self.max_attempts
            );
            return None;
        }
        self.attempts += 1;
        debug!("Reconnect attempt {}/{}", self.attempts, self.max_attempts);
        Some(self.attempts)
    }

    /// `min(backoff_max, backoff_base * 2^(attempt-1))`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    /// Backoff for `attempt` scaled by a uniform factor in `[0.8, 1.2]`
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.backoff_for(attempt).mul_f64(factor)
    }

    /// Clear the attempt counter after a successful connect
    pub fn reset(&mut self) {
        if self.attempts > 0 {
            debug!("Reconnect counter reset after {} attempts", self.attempts);
        }
        self.attempts = 0;
    }

    /// Attempts since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempts allowed before giving up
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether automatic recovery has given up
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
