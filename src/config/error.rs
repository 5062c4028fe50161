//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or updating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),

    /// A required secret is absent or empty.
    #[error("required setting {0} is missing or empty")]
    MissingSecret(&'static str),

    /// A setting is present but cannot be interpreted.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// Reading or writing the file failed.
    #[error("configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
