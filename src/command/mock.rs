//! # Recording Runner
//!
//! [`RecordingRunner`] answers every invocation with a handler closure and keeps the
//! invocations for later assertions. The handler may touch the filesystem to stand in
//! for the real tool (e.g. unpack a fake archive).
//!
//! ```rust
//! use stack_bootstrap::command::mock::RecordingRunner;
//! use stack_bootstrap::command::{CommandOutput, CommandRunner, Invocation};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = RecordingRunner::new(|inv| {
//!         if inv.program == "docker" {
//!             CommandOutput::ok("SERVICE_TOKEN elastic/kibana/t = AAEAAWVs\n")
//!         } else {
//!             CommandOutput::failed(127, "not found")
//!         }
//!     });
//!
//!     let out = runner.run(&Invocation::new("docker").arg("exec")).await.unwrap();
//!     assert!(out.success());
//!     assert_eq!(runner.invocations()[0].program, "docker");
//! }
//! ```

use super::{CommandError, CommandOutput, CommandRunner, Invocation};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

type Handler = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

pub struct RecordingRunner {
    handler: Handler,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new(handler: impl Fn(&Invocation) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| CommandOutput::ok(""))
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invocations whose program is `program`.
    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.program == program)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        Ok((self.handler)(invocation))
    }
}
