//! # External Commands
//!
//! Certificate generation and token issuance delegate to tools shipped with the
//! search engine. Both go through the [`CommandRunner`] seam so the sequences can be
//! exercised without the tools installed ([`mock::RecordingRunner`]).

pub mod mock;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the program to completion. A non-zero exit is *not* an error here;
    /// see [`run_checked`].
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError>;
}

/// Runs `invocation` and turns a non-zero exit into [`CommandError::Failed`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> Result<CommandOutput, CommandError> {
    let output = runner.run(invocation).await?;
    if !output.success() {
        return Err(CommandError::Failed {
            command: invocation.to_string(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
        debug!(command = %invocation.program, args = invocation.args.len(), "Running command");
        let mut command = tokio::process::Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let output = command.output().await.map_err(|source| CommandError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::RecordingRunner;

    #[test]
    fn invocation_renders_and_finds_flags() {
        let inv = Invocation::new("certutil").args(["ca", "--pem", "-out", "certs/ca.zip"]);
        assert_eq!(inv.to_string(), "certutil ca --pem -out certs/ca.zip");
        assert_eq!(inv.flag_value("-out"), Some("certs/ca.zip"));
        assert_eq!(inv.flag_value("--in"), None);
    }

    #[tokio::test]
    async fn run_checked_rejects_non_zero_exit() {
        let runner = RecordingRunner::new(|_| CommandOutput::failed(2, "boom\n"));
        let err = run_checked(&runner, &Invocation::new("unzip").arg("x.zip"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "`unzip x.zip` exited with status 2: boom");
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn process_runner_captures_stdout() {
        let output = ProcessRunner::new()
            .run(&Invocation::new("sh").args(["-c", "echo token = abc; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "token = abc");
        assert!(!output.success());
    }
}
