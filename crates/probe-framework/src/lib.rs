//! # Probe Framework
//!
//! Generic building blocks for "wait until an external dependency is ready" loops.
//! The search stack bootstrap needs several of these (TLS readiness, password
//! rotation acceptance) and they all share the same shape: try something, decide
//! whether the dependency is ready, sleep, try again, give up eventually.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into three layers:
//!
//! 1. **Check Layer** ([`Probe`]) - what a single attempt does and how its result is judged
//! 2. **Policy Layer** ([`RetryPolicy`]) - how long to wait between attempts and when to stop
//! 3. **Runtime Layer** ([`Poller`]) - the loop that drives a probe under a policy
//!
//! You write the check **once** as a [`Probe`], and the [`Poller`] handles sleeping,
//! backoff, attempt caps, deadlines and structured logging.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use probe_framework::{Poller, Probe, RetryPolicy, Verdict};
//! use std::time::Duration;
//!
//! struct PortOpen;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("port probe error")]
//! struct PortError;
//!
//! #[async_trait]
//! impl Probe for PortOpen {
//!     type Output = u16;
//!     type Error = PortError;
//!
//!     fn name(&self) -> &str { "port-open" }
//!
//!     async fn attempt(&self, attempt: u32) -> Result<Verdict<u16>, PortError> {
//!         if attempt < 3 {
//!             Ok(Verdict::not_ready("connection refused"))
//!         } else {
//!             Ok(Verdict::Ready(9200))
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let poller = Poller::new(
//!         RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(5),
//!     );
//!     let port = poller.wait(&PortOpen).await.unwrap();
//!     assert_eq!(port, 9200);
//! }
//! ```
//!
//! ## Failure Model
//!
//! A probe distinguishes two kinds of "no":
//!
//! - [`Verdict::NotReady`] - the dependency is still starting; the poller retries.
//! - `Err(Probe::Error)` - retrying cannot help (bad URL, unreadable CA file); the
//!   poller stops with [`WaitError::Fatal`].
//!
//! When the policy's attempt cap or deadline runs out, the poller stops with
//! [`WaitError::Timeout`], carrying the attempt count and the last reason seen.
//!
//! ## Testing
//!
//! The [`mock`] module provides [`mock::MockProbe`], a scripted probe with an
//! expectation builder, for testing code that drives pollers.

pub mod error;
pub mod mock;
pub mod policy;
pub mod poller;
pub mod probe;
pub mod tracing;

pub use error::WaitError;
pub use policy::{Backoff, RetryPolicy};
pub use poller::Poller;
pub use probe::{Probe, Verdict};
