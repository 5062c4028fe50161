//! # Certificate Bootstrap
//!
//! Creates the certificate authority and the search engine's leaf certificate with
//! the engine's own CA tool, once. Each of the two steps is guarded by a completion
//! marker in the certificate directory:
//!
//! | step | archive    | marker           | unpacks to         |
//! |------|------------|------------------|--------------------|
//! | CA   | `ca.zip`   | `.ca.complete`   | `ca/ca.crt`, `ca/ca.key` |
//! | leaf | `certs.zip`| `.leaf.complete` | `<name>/<name>.crt`, `<name>/<name>.key` |
//!
//! A marker is written (temp file, then rename) only after both the tool and the
//! unpacking succeeded. An archive without its marker is a leftover of an
//! interrupted run; it is removed and the step runs again.

pub mod error;
pub mod permissions;

pub use error::CertError;
pub use permissions::{normalize_permissions, PermissionReport, DIR_MODE, FILE_MODE};

use crate::command::{run_checked, CommandRunner, Invocation};
use crate::config::{Ownership, StackConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Paths inside the certificate directory.
#[derive(Debug, Clone)]
pub struct CertLayout {
    root: PathBuf,
}

impl CertLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ca_archive(&self) -> PathBuf {
        self.root.join("ca.zip")
    }

    pub fn leaf_archive(&self) -> PathBuf {
        self.root.join("certs.zip")
    }

    pub fn instances(&self) -> PathBuf {
        self.root.join("instances.yml")
    }

    pub fn ca_cert(&self) -> PathBuf {
        self.root.join("ca").join("ca.crt")
    }

    pub fn ca_key(&self) -> PathBuf {
        self.root.join("ca").join("ca.key")
    }

    pub fn leaf_cert(&self, name: &str) -> PathBuf {
        self.root.join(name).join(format!("{name}.crt"))
    }

    pub fn marker(&self, step: Step) -> PathBuf {
        self.root.join(match step {
            Step::Ca => ".ca.complete",
            Step::Leaf => ".leaf.complete",
        })
    }
}

/// One entry of `instances.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub dns: Vec<String>,
    pub ip: Vec<String>,
}

impl Instance {
    /// The search engine node: reachable as `es01` inside the stack and as
    /// `localhost` from the host.
    pub fn search_node() -> Self {
        Self {
            name: "es01".to_string(),
            dns: vec!["es01".to_string(), "localhost".to_string()],
            ip: vec!["127.0.0.1".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstancesFile {
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ca,
    Leaf,
}

impl Step {
    fn label(self) -> &'static str {
        match self {
            Step::Ca => "ca",
            Step::Leaf => "leaf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Generated,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub ca: StepOutcome,
    pub leaf: StepOutcome,
    pub permissions: PermissionReport,
}

/// Runs the two generation steps and the permission pass.
pub struct CertBootstrapper {
    layout: CertLayout,
    certutil: String,
    instance: Instance,
    owner: Ownership,
    runner: Arc<dyn CommandRunner>,
}

impl CertBootstrapper {
    pub fn new(config: &StackConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            layout: CertLayout::new(&config.certs_dir),
            certutil: config.certutil_bin.to_string_lossy().into_owned(),
            instance: Instance::search_node(),
            owner: config.certs_owner,
            runner,
        }
    }

    pub fn layout(&self) -> &CertLayout {
        &self.layout
    }

    pub async fn bootstrap(&self) -> Result<BootstrapReport, CertError> {
        let root = self.layout.root();
        fs::create_dir_all(root).map_err(CertError::io(root))?;

        let ca = self.run_step(Step::Ca).await?;
        let leaf = self.run_step(Step::Leaf).await?;
        let permissions = normalize_permissions(root, self.owner)?;

        info!(?ca, ?leaf, owner_applied = permissions.owner_applied, "Certificates ready");
        Ok(BootstrapReport {
            ca,
            leaf,
            permissions,
        })
    }

    async fn run_step(&self, step: Step) -> Result<StepOutcome, CertError> {
        let marker = self.layout.marker(step);
        if marker.exists() {
            info!(step = step.label(), "Already complete, skipping");
            return Ok(StepOutcome::Skipped);
        }

        let archive = match step {
            Step::Ca => self.layout.ca_archive(),
            Step::Leaf => self.layout.leaf_archive(),
        };
        if archive.exists() {
            warn!(step = step.label(), archive = %archive.display(), "Removing archive left by an incomplete run");
            fs::remove_file(&archive).map_err(CertError::io(&archive))?;
        }

        let generate = match step {
            Step::Ca => self.ca_invocation(),
            Step::Leaf => {
                self.write_instances()?;
                self.leaf_invocation()
            }
        };
        info!(step = step.label(), "Generating");
        run_checked(self.runner.as_ref(), &generate).await?;
        run_checked(self.runner.as_ref(), &self.unzip_invocation(&archive)).await?;

        write_marker(&marker)?;
        info!(step = step.label(), "Generated");
        Ok(StepOutcome::Generated)
    }

    fn ca_invocation(&self) -> Invocation {
        Invocation::new(&self.certutil)
            .args(["ca", "--silent", "--pem", "-out"])
            .arg(display(&self.layout.ca_archive()))
    }

    fn leaf_invocation(&self) -> Invocation {
        Invocation::new(&self.certutil)
            .args(["cert", "--silent", "--pem", "-out"])
            .arg(display(&self.layout.leaf_archive()))
            .arg("--in")
            .arg(display(&self.layout.instances()))
            .arg("--ca-cert")
            .arg(display(&self.layout.ca_cert()))
            .arg("--ca-key")
            .arg(display(&self.layout.ca_key()))
    }

    fn unzip_invocation(&self, archive: &Path) -> Invocation {
        Invocation::new("unzip")
            .arg("-o")
            .arg(display(archive))
            .arg("-d")
            .arg(display(self.layout.root()))
    }

    fn write_instances(&self) -> Result<(), CertError> {
        let path = self.layout.instances();
        let yaml = serde_yaml::to_string(&InstancesFile {
            instances: vec![self.instance.clone()],
        })?;
        fs::write(&path, yaml).map_err(CertError::io(&path))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn write_marker(marker: &Path) -> Result<(), CertError> {
    let tmp = marker.with_extension("tmp");
    fs::write(&tmp, format!("{}\n", chrono::Utc::now().to_rfc3339())).map_err(CertError::io(&tmp))?;
    fs::rename(&tmp, marker).map_err(CertError::io(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_descriptor_lists_search_node() {
        let yaml = serde_yaml::to_string(&InstancesFile {
            instances: vec![Instance::search_node()],
        })
        .unwrap();
        let parsed: InstancesFile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.instances[0].name, "es01");
        assert_eq!(parsed.instances[0].dns, vec!["es01", "localhost"]);
        assert_eq!(parsed.instances[0].ip, vec!["127.0.0.1"]);
    }

    #[test]
    fn layout_paths() {
        let layout = CertLayout::new("certs");
        assert_eq!(layout.marker(Step::Ca), PathBuf::from("certs/.ca.complete"));
        assert_eq!(layout.marker(Step::Leaf), PathBuf::from("certs/.leaf.complete"));
        assert_eq!(layout.leaf_cert("es01"), PathBuf::from("certs/es01/es01.crt"));
    }
}
