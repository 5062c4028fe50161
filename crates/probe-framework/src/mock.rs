//! # Mock Probe
//!
//! [`MockProbe<T>`] implements [`Probe`] from a script of expected attempts. It lets
//! you test code that drives a [`Poller`](crate::Poller) without any network or
//! filesystem, and verify afterwards that exactly the scripted attempts happened.
//!
//! ```rust
//! use probe_framework::mock::MockProbe;
//! use probe_framework::{Poller, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut probe = MockProbe::<&'static str>::new("search-engine");
//!     probe.expect_attempts(2).return_not_ready("connection refused");
//!     probe.expect_attempt().return_ready("up");
//!
//!     let poller = Poller::new(RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(5));
//!     assert_eq!(poller.wait(&probe).await.unwrap(), "up");
//!
//!     probe.verify();
//!     assert_eq!(probe.attempts(), 3);
//! }
//! ```

use crate::probe::{Probe, Verdict};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Error injected by [`AttemptExpectationBuilder::return_err`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("mock probe error: {0}")]
pub struct MockProbeError(pub String);

/// One scripted attempt outcome.
enum Expectation<T> {
    Attempt(Result<Verdict<T>, MockProbeError>),
}

type Script<T> = Arc<Mutex<VecDeque<Expectation<T>>>>;

/// A scripted probe with expectation tracking.
pub struct MockProbe<T> {
    name: String,
    expectations: Script<T>,
    attempts: AtomicU32,
}

impl<T: Send + Debug + 'static> MockProbe<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            attempts: AtomicU32::new(0),
        }
    }

    /// Expects one more attempt.
    pub fn expect_attempt(&mut self) -> AttemptExpectationBuilder<T> {
        AttemptExpectationBuilder {
            times: 1,
            expectations: self.expectations.clone(),
        }
    }

    /// Expects `times` more attempts with the same outcome.
    pub fn expect_attempts(&mut self, times: u32) -> AttemptExpectationBuilder<T> {
        AttemptExpectationBuilder {
            times,
            expectations: self.expectations.clone(),
        }
    }

    /// Number of attempts the probe has served so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Panics unless every scripted attempt was consumed.
    pub fn verify(&self) {
        let remaining = lock(&self.expectations).len();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

fn lock<T>(script: &Script<T>) -> MutexGuard<'_, VecDeque<Expectation<T>>> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl<T: Send + Debug + 'static> Probe for MockProbe<T> {
    type Output = T;
    type Error = MockProbeError;

    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, attempt: u32) -> Result<Verdict<T>, MockProbeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.expectations).pop_front();
        match next {
            Some(Expectation::Attempt(outcome)) => outcome,
            None => panic!("Unexpected attempt {} on mock probe {}", attempt, self.name),
        }
    }
}

/// Builder for attempt expectations.
pub struct AttemptExpectationBuilder<T> {
    times: u32,
    expectations: Script<T>,
}

impl<T> AttemptExpectationBuilder<T> {
    pub fn return_not_ready(self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut exps = lock(&self.expectations);
        for _ in 0..self.times {
            exps.push_back(Expectation::Attempt(Ok(Verdict::NotReady(reason.clone()))));
        }
    }

    pub fn return_err(self, error: MockProbeError) {
        let mut exps = lock(&self.expectations);
        for _ in 0..self.times {
            exps.push_back(Expectation::Attempt(Err(error.clone())));
        }
    }
}

impl<T: Clone> AttemptExpectationBuilder<T> {
    pub fn return_ready(self, value: T) {
        let mut exps = lock(&self.expectations);
        for _ in 0..self.times {
            exps.push_back(Expectation::Attempt(Ok(Verdict::Ready(value.clone()))));
        }
    }
}
