//! Retry policy for detection attempts.

use std::time::Duration;

/// Maximum number of detection attempts before an image is parked in
/// `detection_failed`.
pub const DETECTION_MAX_ATTEMPTS: u32 = 3;

/// Base delay before the second attempt.
pub const DETECTION_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on any single backoff delay.
pub const DETECTION_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff: the delay doubles per attempt up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DETECTION_MAX_ATTEMPTS,
            base_delay: DETECTION_BASE_DELAY,
            max_delay: DETECTION_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delays, for tests and synchronous embedding.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }

    /// Whether the given attempt count (1-based) used up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
