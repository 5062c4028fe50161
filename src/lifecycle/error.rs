use crate::certs::CertError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::index::IndexError;
use crate::readiness::ReadinessError;
use crate::stack::StackError;
use crate::transport::TransportError;
use probe_framework::WaitError;
use thiserror::Error;

/// Any failure of a bootstrap step.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Certs(#[from] CertError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Readiness(#[from] WaitError<ReadinessError>),

    #[error(transparent)]
    PasswordRotation(#[from] WaitError<CredentialError>),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl BootstrapError {
    /// `true` when a wait ran out of attempts or time.
    pub fn is_timeout(&self) -> bool {
        match self {
            BootstrapError::Readiness(e) => e.is_timeout(),
            BootstrapError::PasswordRotation(e) => e.is_timeout(),
            _ => false,
        }
    }
}
