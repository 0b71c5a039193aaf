//! Bounded retry policy for artifact lookups
//!
//! Lookups are retried a fixed number of times with a fixed delay between
//! attempts. The bound is kept small: when a plan is being applied nobody sees
//! progress output, so a long retry budget looks like a hang.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of lookup attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts in seconds
pub const DEFAULT_DELAY_SECONDS: u64 = 5;

/// Longest accepted delay between attempts in seconds
pub const MAX_DELAY_SECONDS: u64 = 60;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 5)
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds (default: 5)
    pub delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_seconds: DEFAULT_DELAY_SECONDS,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once and never sleeps
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            delay_seconds: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Worst-case time spent sleeping when every attempt fails
    pub fn worst_case_delay(&self) -> Duration {
        self.delay() * self.max_attempts.saturating_sub(1)
    }

    /// max_attempts must be in [1, 20], delay_seconds in [0, 60]
    pub fn validate(&self) -> Result<(), RetryPolicyError> {
        if self.max_attempts == 0 || self.max_attempts > 20 {
            return Err(RetryPolicyError::AttemptsOutOfBounds {
                value: self.max_attempts,
            });
        }

        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(RetryPolicyError::DelayOutOfBounds {
                value: self.delay_seconds,
            });
        }

        Ok(())
    }
}

/// Retry policy validation errors
#[derive(Debug, thiserror::Error)]
pub enum RetryPolicyError {
    #[error("retry.max_attempts must be in [1, 20], got {value}")]
    AttemptsOutOfBounds { value: u32 },

    #[error("retry.delay_seconds must be in [0, 60], got {value}")]
    DelayOutOfBounds { value: u64 },
}

/// Blocks between retry attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without blocking
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Sum of all requested sleeps
    pub fn total(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay(), Duration::from_secs(5));
        assert_eq!(policy.worst_case_delay(), Duration::from_secs(20));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));

        assert!(!RetryPolicy::single_attempt().should_retry(1));
    }

    #[test]
    fn test_validate_bounds() {
        let zero = RetryPolicy {
            max_attempts: 0,
            delay_seconds: 5,
        };
        assert!(matches!(
            zero.validate(),
            Err(RetryPolicyError::AttemptsOutOfBounds { value: 0 })
        ));

        let slow = RetryPolicy {
            max_attempts: 3,
            delay_seconds: 61,
        };
        assert!(matches!(
            slow.validate(),
            Err(RetryPolicyError::DelayOutOfBounds { value: 61 })
        ));
    }

    #[test]
    fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(5));
        (&sleeper).sleep(Duration::from_secs(2));
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(2)]
        );
        assert_eq!(sleeper.total(), Duration::from_secs(7));
    }
}
