//! # Readiness Checks
//!
//! Two [`Probe`]s against the search engine's HTTPS root:
//!
//! * [`AuthChallengeProbe`]: unauthenticated `GET /`. Ready only when the engine
//!   answers `401` with a `security_exception` about missing credentials, i.e. TLS
//!   and the security layer are both up. Any other reply, a plain `200` included,
//!   keeps it polling.
//! * [`ReachableProbe`]: authenticated `GET /`. Ready on any `2xx`.
//!
//! Transport failures count as "not ready yet"; only a misconfigured transport
//! (bad URL, unreadable CA) is fatal.

use crate::transport::{Credentials, Reply, Request, Transport, TransportError};
use async_trait::async_trait;
use probe_framework::{Probe, Verdict};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Which readiness check to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReadinessCheck {
    AuthChallenge,
    Reachable,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: String,
}

/// `true` iff `reply` is the engine's "authentication required" answer.
pub fn is_auth_challenge(reply: &Reply) -> bool {
    if reply.status != 401 {
        return false;
    }
    match reply.json::<ErrorEnvelope>() {
        Ok(envelope) => {
            envelope.error.kind == "security_exception"
                && envelope
                    .error
                    .reason
                    .to_ascii_lowercase()
                    .contains("missing authentication credentials")
        }
        Err(_) => false,
    }
}

fn transient<T>(error: TransportError) -> Result<Verdict<T>, ReadinessError> {
    if error.is_transient() {
        Ok(Verdict::not_ready(error.to_string()))
    } else {
        Err(error.into())
    }
}

pub struct AuthChallengeProbe {
    transport: Arc<dyn Transport>,
}

impl AuthChallengeProbe {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Probe for AuthChallengeProbe {
    type Output = ();
    type Error = ReadinessError;

    fn name(&self) -> &str {
        "auth-challenge"
    }

    async fn attempt(&self, _attempt: u32) -> Result<Verdict<()>, ReadinessError> {
        let reply = match self.transport.send(Request::get("/")).await {
            Ok(reply) => reply,
            Err(e) => return transient(e),
        };
        if is_auth_challenge(&reply) {
            Ok(Verdict::Ready(()))
        } else {
            Ok(Verdict::not_ready(format!(
                "HTTP {} is not an authentication challenge",
                reply.status
            )))
        }
    }
}

/// What the engine reported about itself once reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub cluster_name: Option<String>,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct RootInfo {
    cluster_name: Option<String>,
    version: Option<VersionInfo>,
}

#[derive(Deserialize)]
struct VersionInfo {
    number: Option<String>,
}

impl NodeInfo {
    fn from_reply(reply: &Reply) -> Self {
        match reply.json::<RootInfo>() {
            Ok(info) => Self {
                cluster_name: info.cluster_name,
                version: info.version.and_then(|v| v.number),
            },
            Err(_) => Self::default(),
        }
    }
}

pub struct ReachableProbe {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
}

impl ReachableProbe {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }
}

#[async_trait]
impl Probe for ReachableProbe {
    type Output = NodeInfo;
    type Error = ReadinessError;

    fn name(&self) -> &str {
        "reachable"
    }

    async fn attempt(&self, _attempt: u32) -> Result<Verdict<NodeInfo>, ReadinessError> {
        let request = Request::get("/").with_auth(self.credentials.clone());
        let reply = match self.transport.send(request).await {
            Ok(reply) => reply,
            Err(e) => return transient(e),
        };
        if reply.is_success() {
            Ok(Verdict::Ready(NodeInfo::from_reply(&reply)))
        } else {
            Ok(Verdict::not_ready(format!("HTTP {}", reply.status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = r#"{"error":{"root_cause":[{"type":"security_exception","reason":"missing authentication credentials for REST request [/]"}],"type":"security_exception","reason":"missing authentication credentials for REST request [/]"},"status":401}"#;

    #[test]
    fn recognizes_engine_challenge() {
        assert!(is_auth_challenge(&Reply::new(401, CHALLENGE)));
    }

    #[test]
    fn rejects_lookalikes() {
        // Right body, wrong status.
        assert!(!is_auth_challenge(&Reply::new(200, CHALLENGE)));
        // 401 from something that is not the engine.
        assert!(!is_auth_challenge(&Reply::new(401, "Unauthorized")));
        // Wrong error type.
        let other = r#"{"error":{"type":"illegal_argument_exception","reason":"missing authentication credentials"}}"#;
        assert!(!is_auth_challenge(&Reply::new(401, other)));
        // Bad credentials rather than missing ones.
        let bad = r#"{"error":{"type":"security_exception","reason":"unable to authenticate user [elastic]"}}"#;
        assert!(!is_auth_challenge(&Reply::new(401, bad)));
    }

    #[test]
    fn node_info_is_lenient() {
        let info = NodeInfo::from_reply(&Reply::new(
            200,
            r#"{"cluster_name":"docker-cluster","version":{"number":"8.15.0"}}"#,
        ));
        assert_eq!(info.cluster_name.as_deref(), Some("docker-cluster"));
        assert_eq!(info.version.as_deref(), Some("8.15.0"));
        assert_eq!(NodeInfo::from_reply(&Reply::new(200, "ok")), NodeInfo::default());
    }
}
