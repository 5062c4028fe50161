use async_trait::async_trait;
use probe_framework::mock::{MockProbe, MockProbeError};
use probe_framework::{Backoff, Poller, Probe, RetryPolicy, Verdict, WaitError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

// --- Test Probe ---

/// Becomes ready on a fixed attempt and counts how often it was asked.
struct CountingProbe {
    ready_on: u32,
    calls: AtomicU32,
}

#[derive(Debug, thiserror::Error)]
#[error("counting probe error")]
struct CountingError;

#[async_trait]
impl Probe for CountingProbe {
    type Output = u32;
    type Error = CountingError;

    fn name(&self) -> &str {
        "counting"
    }

    async fn attempt(&self, attempt: u32) -> Result<Verdict<u32>, CountingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.ready_on {
            Ok(Verdict::Ready(attempt))
        } else {
            Ok(Verdict::not_ready(format!("attempt {attempt} refused")))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_on_first_ready_attempt() {
    let probe = CountingProbe {
        ready_on: 4,
        calls: AtomicU32::new(0),
    };
    let poller = Poller::new(RetryPolicy::fixed(Duration::from_secs(30)).with_max_attempts(10));

    let started = Instant::now();
    let output = poller.wait(&probe).await.expect("probe should become ready");

    assert_eq!(output, 4);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    // Three sleeps of 30s between four attempts.
    assert_eq!(started.elapsed(), Duration::from_secs(90));
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_at_attempt_cap() {
    let mut probe = MockProbe::<()>::new("search-engine");
    probe.expect_attempts(3).return_not_ready("connection refused");

    let poller = Poller::new(RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(3));
    let result = poller.wait(&probe).await;

    match result {
        Err(WaitError::Timeout {
            probe: name,
            attempts,
            last,
        }) => {
            assert_eq!(name, "search-engine");
            assert_eq!(attempts, 3);
            assert_eq!(last, "connection refused");
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    probe.verify();
}

#[tokio::test(start_paused = true)]
async fn test_wait_respects_deadline() {
    let mut probe = MockProbe::<()>::new("deadline");
    probe.expect_attempts(3).return_not_ready("still starting");

    // 10s interval, 25s deadline: attempts at t=0, 10, 20; the next sleep would end at 30.
    let poller = Poller::new(
        RetryPolicy::fixed(Duration::from_secs(10)).with_deadline(Duration::from_secs(25)),
    );
    let started = Instant::now();
    let err = poller.wait(&probe).await.expect_err("deadline should expire");

    assert!(err.is_timeout());
    assert_eq!(started.elapsed(), Duration::from_secs(20));
    probe.verify();
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_stops_immediately() {
    let mut probe = MockProbe::<()>::new("bad-url");
    probe.expect_attempt().return_not_ready("refused");
    probe
        .expect_attempt()
        .return_err(MockProbeError("invalid base url".to_string()));

    let poller = Poller::new(RetryPolicy::fixed(Duration::from_secs(1)).with_max_attempts(100));
    let err = poller.wait(&probe).await.expect_err("fatal error expected");

    match err {
        WaitError::Fatal { probe: name, source } => {
            assert_eq!(name, "bad-url");
            assert_eq!(source, MockProbeError("invalid base url".to_string()));
        }
        other => panic!("expected fatal error, got {:?}", other),
    }
    assert_eq!(probe.attempts(), 2);
    probe.verify();
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_spacing() {
    let mut probe = MockProbe::<&'static str>::new("backoff");
    probe.expect_attempts(4).return_not_ready("refused");
    probe.expect_attempt().return_ready("up");

    let policy = RetryPolicy::fixed(Duration::from_secs(1)).with_backoff(Backoff::Exponential {
        factor: 2.0,
        max: Duration::from_secs(5),
    });
    let started = Instant::now();
    let output = Poller::new(policy).wait(&probe).await.unwrap();

    assert_eq!(output, "up");
    // 1 + 2 + 4 + 5 (capped)
    assert_eq!(started.elapsed(), Duration::from_secs(12));
    probe.verify();
}
