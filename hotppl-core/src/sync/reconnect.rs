//! Reconnect policy.
//!
//! Linear backoff: the n-th reconnect after a loss waits `base × n`, capped
//! at `base × max_attempts`. After `max_attempts` failed reconnects nothing
//! more is scheduled until the host connects again explicitly.

use std::time::Duration;

/// Default delay unit between reconnects.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default reconnect ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt.min(self.max_attempts)
    }
}

/// Retry bookkeeping for one client.
#[derive(Debug, Clone)]
pub(crate) struct Reconnector {
    policy: ReconnectPolicy,
    /// Reconnects made since the last successful open
    attempts: u32,
    /// Reconnects made over the client's lifetime
    total_attempts: u64,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            total_attempts: 0,
        }
    }

    /// Delay before the next reconnect, or `None` once the ceiling is hit.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.attempts < self.policy.max_attempts {
            Some(self.policy.delay_for(self.attempts + 1))
        } else {
            None
        }
    }

    /// Counts a reconnect that is about to start and returns its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.total_attempts += 1;
        self.attempts
    }

    /// A connection opened; the retry budget is restored.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// The host asked for a connection explicitly.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }
}
