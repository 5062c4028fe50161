//! # Wait Errors
//!
//! Errors returned by [`Poller::wait`](crate::Poller::wait).

/// Why a poller stopped without the dependency becoming ready.
#[derive(Debug, thiserror::Error)]
pub enum WaitError<E: std::error::Error + 'static> {
    /// The attempt cap or the deadline ran out while the probe kept reporting `NotReady`.
    #[error("{probe} not ready after {attempts} attempts (last: {last})")]
    Timeout {
        probe: String,
        attempts: u32,
        last: String,
    },
    /// The probe reported an error that retrying cannot fix.
    #[error("{probe} failed: {source}")]
    Fatal {
        probe: String,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> WaitError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}
