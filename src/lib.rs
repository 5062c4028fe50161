//! # Stack Bootstrap
//!
//! > **Stand up a TLS-secured search engine and its dashboard, reproducibly.**
//!
//! The stack is three containers started by a container runtime in dependency order:
//! a one-shot `setup` container, the search engine `es01`, and the dashboard `kibana`.
//! This crate does the work around them that the products do not do themselves:
//! generating the CA and node certificates, waiting for the engine to come up with
//! security enabled, setting the dashboard's service password, issuing the dashboard
//! a service token, and declaring the dependency graph.
//!
//! ## Design
//!
//! ### Configuration is a value
//! The flat `.env` file is parsed once into a [`StackConfig`](config::StackConfig) that
//! is passed to every step. A missing file or empty password fails before anything
//! touches the network or the filesystem.
//!
//! ### Every wait is bounded
//! Readiness checks and the password change are [`Probe`](probe_framework::Probe)s
//! driven by a [`Poller`](probe_framework::Poller) under an explicit
//! [`RetryPolicy`](probe_framework::RetryPolicy). Running out of attempts is a
//! [`WaitError::Timeout`](probe_framework::WaitError::Timeout), not a hang.
//!
//! ### Replies are decoded, not grepped
//! The engine is ready when it answers `401` with a `security_exception`; the password
//! is set when the engine answers `{}`. Both are checked on the decoded JSON.
//!
//! ### Setup is idempotent
//! Each certificate step writes its completion marker atomically after it fully
//! succeeded. Reruns skip finished steps and redo interrupted ones.
//!
//! ## Module Tour
//!
//! - [`config`]: the `.env` file and the typed configuration.
//! - [`command`]: external tools behind [`CommandRunner`](command::CommandRunner).
//! - [`certs`]: CA and leaf certificate generation, permission normalization.
//! - [`transport`]: HTTPS to the engine behind [`Transport`](transport::Transport).
//! - [`readiness`]: the two readiness probes.
//! - [`credentials`]: password rotation and service-token issuance.
//! - [`stack`]: the service graph and its compose rendering.
//! - [`index`]: feed index creation, backup and restore.
//! - [`lifecycle`]: [`Bootstrap`](lifecycle::Bootstrap), which runs the sequences.
//!
//! ## Testing
//!
//! [`command::mock::RecordingRunner`] and [`transport::mock::ScriptedTransport`] stand
//! in for the tools and the engine, so whole sequences run in tests with paused time.
//!
//! ```bash
//! cargo test
//! ```

pub mod certs;
pub mod command;
pub mod config;
pub mod credentials;
pub mod index;
pub mod lifecycle;
pub mod readiness;
pub mod stack;
pub mod transport;
