//! # Bootstrap Lifecycle
//!
//! [`Bootstrap`] wires the configuration, the command runner and the HTTP transport
//! into the two sequences the stack needs:
//!
//! * **setup** (runs inside the `setup` container): certificates, then wait for the
//!   engine's authentication challenge, then set the dashboard service password.
//! * **provision** (runs on the host once the engine is up): wait until the engine
//!   answers authenticated requests, issue a service token for the dashboard, write it
//!   into the configuration file.
//!
//! Every step runs in its own span (`certs`, `readiness`, `password_rotation`,
//! `token_issuance`), so log lines read `readiness: Not ready ...`.
//!
//! The transport is built on first use, after certificate generation, because the
//! HTTPS client pins the CA the first step creates.

pub mod error;

pub use error::BootstrapError;

use crate::certs::{BootstrapReport, CertBootstrapper};
use crate::command::{CommandRunner, ProcessRunner};
use crate::config::{EnvFile, Secret, StackConfig};
use crate::credentials::{store_token, token_name, PasswordRotationProbe, ServiceTokenIssuer};
use crate::index::IndexClient;
use crate::readiness::{AuthChallengeProbe, NodeInfo, ReachableProbe, ReadinessCheck};
use crate::transport::{Credentials, HttpTransport, Transport, TransportError};
use probe_framework::{Poller, RetryPolicy};
use std::sync::Arc;
use tracing::{info, instrument};

type Connector =
    Box<dyn Fn(&StackConfig) -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

/// Outcome of the setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    pub certs: BootstrapReport,
}

pub struct Bootstrap {
    config: StackConfig,
    runner: Arc<dyn CommandRunner>,
    connect: Connector,
}

impl Bootstrap {
    pub fn new(
        config: StackConfig,
        runner: Arc<dyn CommandRunner>,
        connect: impl Fn(&StackConfig) -> Result<Arc<dyn Transport>, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            config,
            runner,
            connect: Box::new(connect),
        }
    }

    /// Real processes and HTTPS pinned to the generated CA.
    pub fn with_defaults(config: StackConfig) -> Self {
        Self::new(config, Arc::new(ProcessRunner::new()), |config| {
            let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(config)?);
            Ok(transport)
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    fn transport(&self) -> Result<Arc<dyn Transport>, BootstrapError> {
        Ok((self.connect)(&self.config)?)
    }

    fn admin(&self) -> Credentials {
        Credentials::admin(&self.config)
    }

    /// Retry policy used for `check`: the setup interval for the auth challenge, the
    /// provisioning interval for plain reachability.
    pub fn policy_for(&self, check: ReadinessCheck) -> RetryPolicy {
        match check {
            ReadinessCheck::AuthChallenge => self.config.poll.setup_policy(),
            ReadinessCheck::Reachable => self.config.poll.provision_policy(),
        }
    }

    #[instrument(name = "certs", skip_all)]
    pub async fn certs(&self) -> Result<BootstrapReport, BootstrapError> {
        let bootstrapper = CertBootstrapper::new(&self.config, self.runner.clone());
        Ok(bootstrapper.bootstrap().await?)
    }

    #[instrument(name = "readiness", skip(self))]
    pub async fn wait(&self, check: ReadinessCheck) -> Result<NodeInfo, BootstrapError> {
        let transport = self.transport()?;
        let poller = Poller::new(self.policy_for(check));
        match check {
            ReadinessCheck::AuthChallenge => {
                poller.wait(&AuthChallengeProbe::new(transport)).await?;
                Ok(NodeInfo::default())
            }
            ReadinessCheck::Reachable => {
                let info = poller
                    .wait(&ReachableProbe::new(transport, self.admin()))
                    .await?;
                info!(cluster = ?info.cluster_name, version = ?info.version, "Engine reachable");
                Ok(info)
            }
        }
    }

    #[instrument(name = "password_rotation", skip_all, fields(user = %self.config.kibana_system_user))]
    pub async fn rotate_password(&self) -> Result<(), BootstrapError> {
        let probe = PasswordRotationProbe::from_config(&self.config, self.transport()?);
        Poller::new(self.config.poll.setup_policy())
            .wait(&probe)
            .await?;
        Ok(())
    }

    /// Certificates, authentication challenge, dashboard password.
    pub async fn setup(&self) -> Result<SetupReport, BootstrapError> {
        info!(certs_dir = %self.config.certs_dir.display(), "Starting setup");
        let certs = self.certs().await?;
        self.wait(ReadinessCheck::AuthChallenge).await?;
        self.rotate_password().await?;
        info!("Setup complete");
        Ok(SetupReport { certs })
    }

    #[instrument(name = "token_issuance", skip_all, fields(container = %self.config.es_container))]
    pub async fn issue_token(&self, env_file: &mut EnvFile) -> Result<Secret, BootstrapError> {
        let issuer = ServiceTokenIssuer::new(&self.config, self.runner.clone());
        let token = issuer.issue(&token_name(chrono::Utc::now())).await?;
        store_token(env_file, &token)?;
        Ok(token)
    }

    /// Reachability, service token, configuration update. `env_file` must be the file
    /// the configuration was loaded from.
    pub async fn provision(&self, env_file: &mut EnvFile) -> Result<Secret, BootstrapError> {
        info!(url = %self.config.es_url, "Starting provisioning");
        self.wait(ReadinessCheck::Reachable).await?;
        let token = self.issue_token(env_file).await?;
        info!("Provisioning complete");
        Ok(token)
    }

    /// Client for the feed index, authenticated as the administrator.
    pub fn index_client(&self, index: &str) -> Result<IndexClient, BootstrapError> {
        Ok(IndexClient::new(self.transport()?, self.admin(), index))
    }
}
