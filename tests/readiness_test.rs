mod common;

use common::CHALLENGE;
use probe_framework::{Poller, Probe, RetryPolicy, Verdict, WaitError};
use stack_bootstrap::config::Secret;
use stack_bootstrap::credentials::PasswordRotationProbe;
use stack_bootstrap::readiness::{AuthChallengeProbe, ReachableProbe, ReadinessError};
use stack_bootstrap::transport::mock::ScriptedTransport;
use stack_bootstrap::transport::{Credentials, Method, TransportError};
use std::sync::Arc;
use std::time::Duration;

fn admin() -> Credentials {
    Credentials::new("elastic", Secret::new("changeme"))
}

#[tokio::test]
async fn test_auth_challenge_verdicts() {
    let mut transport = ScriptedTransport::new();
    transport
        .expect(Method::Get, "/")
        .return_err(TransportError::Timeout("10s elapsed".into()));
    transport.expect(Method::Get, "/").return_reply(200, "{}");
    transport.expect(Method::Get, "/").return_reply(401, "Unauthorized");
    transport.expect(Method::Get, "/").return_reply(401, CHALLENGE);
    let probe = AuthChallengeProbe::new(Arc::new(transport));

    for attempt in 1..=3 {
        let verdict = probe.attempt(attempt).await.unwrap();
        assert!(!verdict.is_ready(), "attempt {attempt}: {verdict:?}");
    }
    assert_eq!(probe.attempt(4).await.unwrap(), Verdict::Ready(()));
}

#[tokio::test(start_paused = true)]
async fn test_misconfigured_transport_is_fatal() {
    let mut transport = ScriptedTransport::new();
    transport.expect(Method::Get, "/").return_err(TransportError::Ca {
        path: "certs/ca/ca.crt".into(),
        reason: "no such file".into(),
    });
    let probe = ReachableProbe::new(Arc::new(transport), admin());

    let err = Poller::new(RetryPolicy::fixed(Duration::from_secs(5)).with_max_attempts(10))
        .wait(&probe)
        .await
        .unwrap_err();

    match err {
        WaitError::Fatal { probe, source } => {
            assert_eq!(probe, "reachable");
            assert!(matches!(source, ReadinessError::Transport(TransportError::Ca { .. })));
        }
        other => panic!("expected fatal error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reachable_accepts_any_success() {
    let mut transport = ScriptedTransport::new();
    transport.expect(Method::Get, "/").return_reply(401, CHALLENGE);
    transport.expect(Method::Get, "/").return_reply(204, "");
    let probe = ReachableProbe::new(Arc::new(transport), admin());

    assert!(!probe.attempt(1).await.unwrap().is_ready());
    assert!(probe.attempt(2).await.unwrap().is_ready());
}

#[tokio::test]
async fn test_password_rotation_needs_empty_object() {
    let path = "/_security/user/kibana_system/_password";
    let mut transport = ScriptedTransport::new();
    transport.expect(Method::Post, path).return_reply(400, "{}");
    transport.expect(Method::Post, path).return_reply(200, "not json");
    transport
        .expect(Method::Post, path)
        .return_reply(200, r#"{"acknowledged":true}"#);
    transport.expect(Method::Post, path).return_reply(200, "{}");
    let transport = Arc::new(transport);

    let probe = PasswordRotationProbe::new(
        transport.clone(),
        admin(),
        "kibana_system",
        Secret::new("kibana-secret"),
    );
    assert_eq!(probe.path(), path);

    for attempt in 1..=3 {
        assert!(!probe.attempt(attempt).await.unwrap().is_ready());
    }
    assert!(probe.attempt(4).await.unwrap().is_ready());
    transport.verify();
}
