//! Reconnect attempt accounting with exponential backoff.

use std::time::Duration;

use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before attempt `n` (1-indexed): `base_delay * 2^(n-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Number of reconnect attempts scheduled since the last successful connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Schedule the next attempt, or give up once `max_attempts` have been made.
    pub fn next(&mut self, policy: &BackoffPolicy) -> RetryDecision {
        if self.attempt >= policy.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempt,
            };
        }
        self.attempt += 1;
        RetryDecision::Retry {
            attempt: self.attempt,
            delay: policy.delay_for(self.attempt),
        }
    }
}
