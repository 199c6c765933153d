//! Bounded reset retries after motor failsafes

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Send a reset after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Bound exceeded; take the machine out of rotation
    Exhausted { attempts: u32 },
}

/// Per-machine failsafe counter
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl RecoveryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    pub fn on_timeout(&mut self) -> RecoveryDecision {
        if self.attempts >= self.max_attempts {
            return RecoveryDecision::Exhausted {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        RecoveryDecision::Retry {
            attempt: self.attempts,
            delay: self.delay,
        }
    }

    /// Machine completed a clean cycle
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
