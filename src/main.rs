//! # stack-bootstrap
//!
//! Command-line entry point. Typical use:
//!
//! ```bash
//! cargo build --release --target x86_64-unknown-linux-musl
//! stack-bootstrap compose --out docker-compose.yml
//! docker compose up -d          # the setup container runs `stack-bootstrap setup`
//! stack-bootstrap provision     # on the host, once es01 is healthy
//! docker compose up -d kibana   # picks up the new token
//! ```
//!
//! The setup service mounts the musl build into the engine image, whose libc need
//! not match the host's.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use probe_framework::tracing::setup_tracing;
use stack_bootstrap::config::{EnvFile, Overrides, StackConfig};
use stack_bootstrap::index::DEFAULT_INDEX;
use stack_bootstrap::lifecycle::Bootstrap;
use stack_bootstrap::readiness::ReadinessCheck;
use stack_bootstrap::stack::StackSpec;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "stack-bootstrap", version, about = "Bootstrap the search engine and dashboard stack")]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalOpts {
    /// Configuration file shared with the container runtime.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Overrides CERTS_DIR.
    #[arg(long, global = true)]
    certs_dir: Option<PathBuf>,

    /// Overrides ES_URL.
    #[arg(long, global = true)]
    es_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Certificates, wait for the authentication challenge, set the dashboard password.
    Setup,
    /// Generate certificates only.
    Certs,
    /// Run one readiness check until it passes or the retry policy runs out.
    Wait {
        #[arg(long, value_enum, default_value = "auth-challenge")]
        check: ReadinessCheck,
    },
    /// Set the dashboard service account password.
    RotatePassword,
    /// Wait for the engine, issue a dashboard service token, store it in the env file.
    Provision,
    /// Render the compose document.
    Compose {
        /// Write to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Feed index maintenance.
    Index {
        #[arg(long, default_value = DEFAULT_INDEX)]
        index: String,

        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Debug, Subcommand)]
enum IndexAction {
    /// Create the index with the feed mapping unless it exists.
    Ensure,
    /// Write a gzip NDJSON backup into a directory.
    Backup {
        #[arg(long, default_value = "elasticsearch_backups")]
        dir: PathBuf,
    },
    /// Load a backup file into the index.
    Restore {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.global.log_level);

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %e, "Failed");
    }
    result
}

/// Reads the env file and builds the bootstrap from it. Nothing else happens
/// before this succeeds.
fn load(opts: &GlobalOpts) -> anyhow::Result<(EnvFile, Bootstrap)> {
    let env_file = EnvFile::load(&opts.env_file)?;
    let config = StackConfig::from_env_file(&env_file)
        .and_then(|config| {
            config.with_overrides(Overrides {
                certs_dir: opts.certs_dir.clone(),
                es_url: opts.es_url.clone(),
            })
        })
        .with_context(|| format!("loading {}", opts.env_file.display()))?;
    info!(env_file = %opts.env_file.display(), es_url = %config.es_url, "Configuration loaded");
    Ok((env_file, Bootstrap::with_defaults(config)))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Only ${VAR} references: no configuration needed.
        Command::Compose { out } => {
            let stack = StackSpec::default_stack();
            match out {
                Some(path) => stack.write_compose(&path)?,
                None => print!("{}", stack.render_compose()?),
            }
        }
        Command::Setup => {
            let (_, bootstrap) = load(&cli.global)?;
            bootstrap.setup().await?;
        }
        Command::Certs => {
            let (_, bootstrap) = load(&cli.global)?;
            let report = bootstrap.certs().await?;
            info!(ca = ?report.ca, leaf = ?report.leaf, "Certificates done");
        }
        Command::Wait { check } => {
            let (_, bootstrap) = load(&cli.global)?;
            bootstrap.wait(check).await?;
        }
        Command::RotatePassword => {
            let (_, bootstrap) = load(&cli.global)?;
            bootstrap.rotate_password().await?;
        }
        Command::Provision => {
            let (mut env_file, bootstrap) = load(&cli.global)?;
            bootstrap.provision(&mut env_file).await?;
        }
        Command::Index { index, action } => {
            let (_, bootstrap) = load(&cli.global)?;
            let client = bootstrap.index_client(&index)?;
            match action {
                IndexAction::Ensure => {
                    client.ensure().await?;
                }
                IndexAction::Backup { dir } => {
                    let report = client.backup(&dir).await?;
                    info!(file = %report.path.display(), documents = report.documents, "Backup written");
                }
                IndexAction::Restore { file } => {
                    let report = client.restore(&file).await?;
                    info!(documents = report.documents, batches = report.batches, "Backup restored");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn wait_accepts_both_checks() {
        let cli = Cli::parse_from(["stack-bootstrap", "wait", "--check", "reachable"]);
        assert!(matches!(
            cli.command,
            Command::Wait {
                check: ReadinessCheck::Reachable
            }
        ));
        assert_eq!(cli.global.env_file, PathBuf::from(".env"));
    }

    #[test]
    fn global_overrides_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "stack-bootstrap",
            "setup",
            "--es-url",
            "https://es01:9200",
            "--certs-dir",
            "config/certs",
        ]);
        assert_eq!(cli.global.es_url.as_deref(), Some("https://es01:9200"));
        assert_eq!(cli.global.certs_dir, Some(PathBuf::from("config/certs")));
    }
}
