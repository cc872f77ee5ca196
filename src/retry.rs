//! Bounded exponential backoff for transient storage failures.
//!
//! Only the schedule lives here. The booking path owns the loop because each
//! attempt must re-run the whole admission check instead of replaying a result.

use std::time::Duration;

/// Retry schedule for admission attempts.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 10ms
/// - `max_delay`: 500ms
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: usize,
    pub initial_delay: Duration,
    /// Cap for the exponential growth.
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// A policy that gives up after the first failure.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Delay before retry number `attempt` (0-based):
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_secs(1))
            .multiplier(2.0)
            .build();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(80));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(300))
            .build();
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(10_000), Duration::from_millis(300));
    }

    #[test]
    fn none_means_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
    }
}
