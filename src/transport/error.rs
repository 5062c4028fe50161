use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot load CA certificate {path}: {reason}")]
    Ca { path: PathBuf, reason: String },

    #[error("cannot build HTTP client: {0}")]
    Client(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// `true` for failures a later attempt may not see: refused connections,
    /// TLS not up yet, timeouts, truncated replies.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Request(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            TransportError::InvalidUrl {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: e.to_string(),
            }
        } else if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}
