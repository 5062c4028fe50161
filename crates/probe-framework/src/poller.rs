//! # Poller
//!
//! Drives a [`Probe`] under a [`RetryPolicy`] until it reports ready, fails fatally,
//! or the policy runs out.

use crate::error::WaitError;
use crate::policy::RetryPolicy;
use crate::probe::{Probe, Verdict};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// The retry loop shared by every readiness check.
///
/// A poller holds no state besides its policy, so one instance can drive
/// several probes one after another.
///
/// ## Operations
///
/// * **wait**:
///     1. Runs `probe.attempt(n)` starting at `n = 1`.
///     2. `Ready(output)` returns `Ok(output)` immediately.
///     3. `NotReady(reason)` checks the attempt cap and the deadline, then sleeps
///        for `policy.delay_after(n)` and tries again.
///     4. `Err(e)` returns [`WaitError::Fatal`] without retrying.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: RetryPolicy,
}

impl Poller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn wait<P: Probe>(&self, probe: &P) -> Result<P::Output, WaitError<P::Error>> {
        let name = probe.name();
        let started = Instant::now();
        if self.policy.is_unbounded() {
            warn!(probe = name, "Polling without attempt cap or deadline");
        }
        info!(probe = name, interval = ?self.policy.interval, "Waiting for readiness");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match probe.attempt(attempt).await {
                Ok(Verdict::Ready(output)) => {
                    info!(probe = name, attempt, elapsed = ?started.elapsed(), "Ready");
                    debug!(probe = name, ?output, "Probe output");
                    return Ok(output);
                }
                Ok(Verdict::NotReady(reason)) => {
                    let delay = self.policy.delay_after(attempt);
                    let out_of_attempts = !self.policy.allows_attempt(attempt.saturating_add(1));
                    let past_deadline = self
                        .policy
                        .deadline
                        .is_some_and(|deadline| started.elapsed() + delay > deadline);

                    if out_of_attempts || past_deadline {
                        warn!(probe = name, attempt, reason = %reason, "Giving up");
                        return Err(WaitError::Timeout {
                            probe: name.to_string(),
                            attempts: attempt,
                            last: reason,
                        });
                    }

                    info!(probe = name, attempt, reason = %reason, retry_in = ?delay, "Not ready");
                    sleep(delay).await;
                }
                Err(source) => {
                    warn!(probe = name, attempt, error = %source, "Probe failed");
                    return Err(WaitError::Fatal {
                        probe: name.to_string(),
                        source,
                    });
                }
            }
        }
    }
}
