//! Reconnect and resend policy.
//!
//! The client never hard-codes "retry" or "give up": it asks a
//! [`RetryPolicy`] for the delay before attempt `n` and stops when the policy
//! says `None`.

use std::time::Duration;

/// Default first backoff delay.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How a failed operation is retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Never retry. The failure is surfaced and left to the caller.
    #[default]
    Never,

    /// Retry with exponential backoff.
    Backoff {
        /// Maximum number of retries after the first failure.
        max_attempts: u32,
        /// Delay before the first retry; doubles for each one after.
        initial: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

impl RetryPolicy {
    /// Exponential backoff with default delays.
    #[must_use]
    pub fn backoff(max_attempts: u32) -> Self {
        Self::Backoff { max_attempts, initial: DEFAULT_INITIAL_BACKOFF, max: DEFAULT_MAX_BACKOFF }
    }

    /// Delay before retry number `attempt` (1-based). `None` means give up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Backoff { max_attempts, initial, max } => {
                if attempt == 0 || attempt > max_attempts {
                    return None;
                }
                let factor = 1u32 << (attempt - 1).min(16);
                Some(initial.saturating_mul(factor).min(max))
            },
        }
    }

    /// Maximum number of retries this policy allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match *self {
            Self::Never => 0,
            Self::Backoff { max_attempts, .. } => max_attempts,
        }
    }
}
