//! # Retry Policy
//!
//! Explicit description of how long a [`Poller`](crate::Poller) keeps trying.

use std::time::Duration;

/// Delay growth between consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Every retry waits exactly `interval`.
    Fixed,
    /// Retry `n` waits `interval * factor^(n-1)`, never more than `max`.
    Exponential { factor: f64, max: Duration },
}

/// How often and for how long a probe is retried.
///
/// `max_attempts` counts every attempt including the first. `deadline` bounds the
/// total time spent waiting; an attempt is never started if its preceding sleep
/// would cross the deadline. Leaving both unset means "retry forever".
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Unbounded fixed-interval policy. Chain `with_*` calls to bound it.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            deadline: None,
            backoff: Backoff::Fixed,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether attempt number `attempt` (1-based) may run under the attempt cap.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Sleep before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { factor, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let scaled = self.interval.as_secs_f64() * factor.powi(exponent);
                let cap = max.as_secs_f64();
                if scaled.is_finite() && scaled >= 0.0 {
                    Duration::from_secs_f64(scaled.min(cap))
                } else {
                    max
                }
            }
        }
    }

    /// True when neither an attempt cap nor a deadline is configured.
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.deadline.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_never_changes() {
        let policy = RetryPolicy::fixed(Duration::from_secs(30));
        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(50), Duration::from_secs(30));
    }

    #[test]
    fn exponential_delay_doubles_until_cap() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_backoff(Backoff::Exponential {
            factor: 2.0,
            max: Duration::from_secs(60),
        });
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(7), Duration::from_secs(60));
        assert_eq!(policy.delay_after(5_000), Duration::from_secs(60));
    }

    #[test]
    fn attempt_cap_counts_the_first_attempt() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(3);
        assert!(policy.allows_attempt(3));
        assert!(!policy.allows_attempt(4));
        assert!(!policy.is_unbounded());
        assert!(RetryPolicy::fixed(Duration::ZERO).is_unbounded());
    }
}
