//! # Retry Policy
//!
//! Decides what happens after the channel is lost. The delay grows linearly:
//! attempt `n` waits `n * base_delay`. After `max_retries` consecutive failed
//! attempts the policy gives up until the caller connects again explicitly.

use std::time::Duration;

/// Default number of automatic reconnection attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default base delay between reconnection attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3000);

/// Outcome of consulting the policy after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after `delay`; this is attempt number `attempt` (1-based).
    Retry {
        /// The new retry count.
        attempt: u32,
        /// How long to wait before reconnecting.
        delay: Duration,
    },
    /// The retry budget is spent.
    Exhausted,
}

/// Bounded linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum automatic attempts before giving up.
    pub max_retries: u32,
    /// Delay unit; attempt `n` waits `n` of these.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Consults the policy after a close, given the retry count so far.
    pub fn on_close(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        let attempt = retry_count + 1;
        RetryDecision::Retry {
            attempt,
            delay: self.base_delay.saturating_mul(attempt),
        }
    }
}
