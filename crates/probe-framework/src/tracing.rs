//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for the bootstrap binary.
//!
//! ## Configuration
//!
//! - `RUST_LOG` wins when set (e.g. `RUST_LOG=stack_bootstrap=debug,probe_framework=info`).
//! - Otherwise the caller's default directive applies (the CLI passes its `--log-level`).
//!
//! The format is compact and hides module paths (`with_target(false)`); spans show
//! inline, so a retry inside the readiness step reads like:
//!
//! ```text
//! INFO readiness: Not ready probe="auth-challenge" attempt=3 reason="connection refused" retry_in=30s
//! ```
//!
//! Secrets are never recorded as fields. Configuration types redact them in `Debug`.
pub fn setup_tracing(default_directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    // try_init: a second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
