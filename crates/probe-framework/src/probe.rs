//! # Probe Abstraction
//!
//! A [`Probe`] performs one readiness check and judges the result. It owns no
//! retry logic; that lives in [`Poller`](crate::Poller).

use async_trait::async_trait;
use std::fmt::Debug;

/// Outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T> {
    /// The dependency is ready; carries whatever the probe learned on the way.
    Ready(T),
    /// The dependency is not ready yet. The string is a short human-readable reason.
    NotReady(String),
}

impl<T> Verdict<T> {
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Verdict::NotReady(reason.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Verdict::Ready(_))
    }
}

/// Trait that any readiness check must implement to be driven by a [`Poller`](crate::Poller).
///
/// # Associated Types
///
/// - `Output`: what a successful attempt yields (e.g. the decoded reply).
/// - `Error`: non-retryable failures. Anything that might succeed on a later attempt
///   must be reported as [`Verdict::NotReady`] instead.
///
/// The attempt counter passed to [`Probe::attempt`] starts at 1.
#[async_trait]
pub trait Probe: Send + Sync {
    type Output: Send + Debug;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stable name used in logs and timeout errors.
    fn name(&self) -> &str;

    async fn attempt(&self, attempt: u32) -> Result<Verdict<Self::Output>, Self::Error>;
}
