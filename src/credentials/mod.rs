//! # Credential Provisioning
//!
//! * [`PasswordRotationProbe`] sets the dashboard service account's password through
//!   the security API. The engine answers a successful change with `{}`; anything
//!   else is retried by the poller.
//! * [`ServiceTokenIssuer`] creates a service token for the dashboard with the
//!   engine's token tool, and [`store_token`] writes it into the configuration file.

use crate::command::{run_checked, CommandError, CommandRunner, Invocation};
use crate::config::{ConfigError, EnvFile, Secret, StackConfig, SERVICE_TOKEN_KEY};
use crate::transport::{Credentials, Request, Transport, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use probe_framework::{Probe, Verdict};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Service account the issued token belongs to.
pub const TOKEN_SERVICE: &str = "elastic/kibana";
const TOKEN_TOOL: &str = "bin/elasticsearch-service-tokens";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("no token found in output of `{command}`")]
    TokenExtraction { command: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// `true` iff `body` decodes to exactly `{}`.
pub fn is_empty_object(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.as_object().map(|m| m.is_empty()))
        .unwrap_or(false)
}

pub struct PasswordRotationProbe {
    transport: Arc<dyn Transport>,
    admin: Credentials,
    user: String,
    password: Secret,
}

impl PasswordRotationProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        admin: Credentials,
        user: impl Into<String>,
        password: Secret,
    ) -> Self {
        Self {
            transport,
            admin,
            user: user.into(),
            password,
        }
    }

    /// Rotates the dashboard service account's password to `KIBANA_PASSWORD`.
    pub fn from_config(config: &StackConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            transport,
            Credentials::admin(config),
            &config.kibana_system_user,
            config.kibana_password.clone(),
        )
    }

    pub fn path(&self) -> String {
        format!("/_security/user/{}/_password", self.user)
    }
}

#[async_trait]
impl Probe for PasswordRotationProbe {
    type Output = ();
    type Error = CredentialError;

    fn name(&self) -> &str {
        "password-rotation"
    }

    async fn attempt(&self, _attempt: u32) -> Result<Verdict<()>, CredentialError> {
        let request = Request::post(self.path())
            .with_auth(self.admin.clone())
            .json(json!({ "password": self.password.expose() }));

        let reply = match self.transport.send(request).await {
            Ok(reply) => reply,
            Err(e) if e.is_transient() => return Ok(Verdict::not_ready(e.to_string())),
            Err(e) => return Err(e.into()),
        };
        if reply.is_success() && is_empty_object(&reply.body) {
            info!(user = %self.user, "Password set");
            Ok(Verdict::Ready(()))
        } else {
            Ok(Verdict::not_ready(format!(
                "HTTP {} without the empty acknowledgement",
                reply.status
            )))
        }
    }
}

/// Token in the tool's `SERVICE_TOKEN <service>/<name> = <token>` output: the text
/// after the first ` = ` up to the end of that line, trimmed.
pub fn extract_token(output: &str) -> Option<String> {
    let (_, rest) = output.split_once(" = ")?;
    let token = rest.lines().next().unwrap_or_default().trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Token name unique per second, so reruns never collide with an existing token.
pub fn token_name(now: DateTime<Utc>) -> String {
    format!("kibana-token-{}", now.format("%Y%m%d%H%M%S"))
}

pub struct ServiceTokenIssuer {
    runner: Arc<dyn CommandRunner>,
    container: String,
}

impl ServiceTokenIssuer {
    pub fn new(config: &StackConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            container: config.es_container.clone(),
        }
    }

    pub fn invocation(&self, name: &str) -> Invocation {
        Invocation::new("docker")
            .arg("exec")
            .arg(&self.container)
            .args([TOKEN_TOOL, "create", TOKEN_SERVICE, name])
    }

    pub async fn issue(&self, name: &str) -> Result<Secret, CredentialError> {
        let invocation = self.invocation(name);
        let output = run_checked(self.runner.as_ref(), &invocation).await?;
        let token = extract_token(&output.stdout).ok_or_else(|| {
            CredentialError::TokenExtraction {
                command: invocation.to_string(),
            }
        })?;
        info!(service = TOKEN_SERVICE, name, "Service token issued");
        Ok(Secret::new(token))
    }
}

/// Replaces the token line of the configuration file and writes it back atomically.
pub fn store_token(file: &mut EnvFile, token: &Secret) -> Result<(), CredentialError> {
    file.set(SERVICE_TOKEN_KEY, token.expose());
    file.persist()?;
    info!(path = %file.path().display(), key = SERVICE_TOKEN_KEY, "Token written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn extracts_token_after_separator() {
        assert_eq!(extract_token("... = abc123\n"), Some("abc123".to_string()));
        assert_eq!(
            extract_token("SERVICE_TOKEN elastic/kibana/t1 = AAEAAWVs  \nwarning: x = y\n"),
            Some("AAEAAWVs".to_string())
        );
    }

    #[test]
    fn no_token_without_separator_or_value() {
        assert_eq!(extract_token("ERROR: service token exists"), None);
        assert_eq!(extract_token("SERVICE_TOKEN elastic/kibana/t1 = \n"), None);
        assert_eq!(extract_token(""), None);
    }

    #[test]
    fn empty_object_is_exact() {
        assert!(is_empty_object("{}"));
        assert!(is_empty_object(" { }\n"));
        assert!(!is_empty_object(r#"{"acknowledged":true}"#));
        assert!(!is_empty_object("[]"));
        assert!(!is_empty_object(""));
    }

    #[test]
    fn token_name_carries_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 12, 7, 21, 23, 38).unwrap();
        assert_eq!(token_name(now), "kibana-token-20241207212338");
    }
}
