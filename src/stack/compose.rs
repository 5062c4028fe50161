//! Compose document rendering.

use super::{HealthCheck, ServiceNode, StackError, StackSpec};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Serialize)]
struct ComposeFile<'a> {
    services: BTreeMap<&'a str, Service<'a>>,
    volumes: BTreeMap<&'a str, Volume>,
}

#[derive(Serialize)]
struct Service<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    container_name: Option<&'a str>,
    image: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<&'a str>,
    #[serde(skip_serializing_if = "no_items")]
    command: &'a [String],
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    depends_on: BTreeMap<&'a str, Condition>,
    #[serde(skip_serializing_if = "no_items")]
    volumes: &'a [String],
    #[serde(skip_serializing_if = "no_items")]
    ports: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    environment: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mem_limit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ulimits: Option<Ulimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<Health>,
}

#[derive(Serialize)]
struct Condition {
    condition: &'static str,
}

#[derive(Serialize)]
struct Ulimits {
    memlock: Limit,
}

#[derive(Serialize)]
struct Limit {
    soft: i64,
    hard: i64,
}

#[derive(Serialize)]
struct Health {
    test: Vec<String>,
    interval: String,
    timeout: String,
    retries: u32,
}

#[derive(Serialize)]
struct Volume {
    driver: &'static str,
}

fn no_items(items: &&[String]) -> bool {
    items.is_empty()
}

fn seconds(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

impl From<&HealthCheck> for Health {
    fn from(check: &HealthCheck) -> Self {
        Self {
            test: vec!["CMD-SHELL".to_string(), check.command.clone()],
            interval: seconds(check.interval),
            timeout: seconds(check.timeout),
            retries: check.retries,
        }
    }
}

impl<'a> From<&'a ServiceNode> for Service<'a> {
    fn from(node: &'a ServiceNode) -> Self {
        Self {
            container_name: node.container_name.as_deref(),
            image: &node.image,
            user: node.user.as_deref(),
            working_dir: node.working_dir.as_deref(),
            command: &node.command,
            depends_on: node
                .depends_on
                .iter()
                .map(|dep| {
                    (
                        dep.as_str(),
                        Condition {
                            condition: "service_healthy",
                        },
                    )
                })
                .collect(),
            volumes: &node.volumes,
            ports: &node.ports,
            environment: node
                .environment
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
            mem_limit: node.mem_limit.as_deref(),
            ulimits: node.memlock_unlimited.then_some(Ulimits {
                memlock: Limit { soft: -1, hard: -1 },
            }),
            healthcheck: node.healthcheck.as_ref().map(Health::from),
        }
    }
}

/// Validates `stack` and renders it as a compose YAML document.
pub fn render_compose(stack: &StackSpec) -> Result<String, StackError> {
    stack.validate()?;
    let file = ComposeFile {
        services: stack
            .nodes
            .iter()
            .map(|node| (node.name.as_str(), Service::from(node)))
            .collect(),
        volumes: stack
            .volumes
            .iter()
            .map(|v| (v.as_str(), Volume { driver: "local" }))
            .collect(),
    };
    Ok(serde_yaml::to_string(&file)?)
}

impl StackSpec {
    pub fn render_compose(&self) -> Result<String, StackError> {
        render_compose(self)
    }

    pub fn write_compose(&self, path: &Path) -> Result<(), StackError> {
        let yaml = self.render_compose()?;
        std::fs::write(path, yaml).map_err(|source| StackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), services = self.nodes.len(), "Compose document written");
        Ok(())
    }
}
