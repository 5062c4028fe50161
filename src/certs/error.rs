use crate::command::CommandError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot walk certificate tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot write instances descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),
}

impl CertError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CertError::Io { path, source }
    }
}
