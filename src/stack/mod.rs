//! # Stack Declaration
//!
//! The three services and their start gates, as data:
//!
//! ```text
//! setup ──healthy──▶ es01 ──healthy──▶ kibana
//! ```
//!
//! `setup` is healthy once the leaf certificate exists, `es01` once it answers with an
//! authentication challenge, `kibana` once its login redirect is served. The container
//! runtime runs those health checks itself; this module only declares them, checks the
//! graph and renders it as a compose document. Values stay `${VAR}` references that
//! the runtime resolves from the same configuration file.

pub mod compose;

pub use compose::render_compose;

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("service {0} is declared twice")]
    DuplicateService(String),

    #[error("service {service} depends on unknown service {dependency}")]
    UnknownDependency { service: String, dependency: String },

    #[error("service {service} waits for {dependency}, which has no health check")]
    UngatedDependency { service: String, dependency: String },

    #[error("dependency cycle between: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("cannot render compose document: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("cannot write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A health check the container runtime runs inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Shell command; exit status 0 means healthy.
    pub command: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceNode {
    pub name: String,
    /// Fixed container name, so `docker exec` can address the container directly.
    pub container_name: Option<String>,
    pub image: String,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub command: Vec<String>,
    /// Services that must be healthy before this one starts.
    pub depends_on: Vec<String>,
    pub volumes: Vec<String>,
    pub ports: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub mem_limit: Option<String>,
    pub memlock_unlimited: bool,
    pub healthcheck: Option<HealthCheck>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    pub nodes: Vec<ServiceNode>,
    /// Named volumes shared between services.
    pub volumes: Vec<String>,
}

const ES_IMAGE: &str = "docker.elastic.co/elasticsearch/elasticsearch:${STACK_VERSION}";
const KIBANA_IMAGE: &str = "docker.elastic.co/kibana/kibana:${STACK_VERSION}";
/// Host certificate directory, the same `CERTS_DIR` the host-side commands read.
const ES_CERTS: &str = "${CERTS_DIR:-./certs}:/usr/share/elasticsearch/config/certs";
const KIBANA_CERTS: &str = "${CERTS_DIR:-./certs}:/usr/share/kibana/config/certs";
/// Statically linked so it runs inside the engine image whatever its libc.
const BOOTSTRAP_BINARY: &str = "./target/x86_64-unknown-linux-musl/release/stack-bootstrap";

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl StackSpec {
    /// The certificate bootstrap, the search engine and the dashboard.
    pub fn default_stack() -> Self {
        let setup = ServiceNode {
            name: "setup".to_string(),
            image: ES_IMAGE.to_string(),
            user: Some("0".to_string()),
            working_dir: Some("/usr/share/elasticsearch".to_string()),
            command: strings(&[
                "stack-bootstrap",
                "--env-file",
                "/usr/share/elasticsearch/.env",
                "--certs-dir",
                "config/certs",
                "--es-url",
                "https://es01:9200",
                "setup",
            ]),
            volumes: vec![
                ES_CERTS.to_string(),
                "./.env:/usr/share/elasticsearch/.env:ro".to_string(),
                format!("{BOOTSTRAP_BINARY}:/usr/local/bin/stack-bootstrap:ro"),
            ],
            healthcheck: Some(HealthCheck {
                command: "[ -f config/certs/es01/es01.crt ]".to_string(),
                interval: Duration::from_secs(1),
                timeout: Duration::from_secs(5),
                retries: 120,
            }),
            ..Default::default()
        };

        let es01 = ServiceNode {
            name: "es01".to_string(),
            container_name: Some("${ES_CONTAINER:-es01}".to_string()),
            image: ES_IMAGE.to_string(),
            depends_on: strings(&["setup"]),
            volumes: strings(&[ES_CERTS, "esdata01:/usr/share/elasticsearch/data"]),
            ports: strings(&["${ES_PORT}:9200"]),
            environment: env(&[
                ("node.name", "es01"),
                ("cluster.name", "${CLUSTER_NAME}"),
                ("discovery.type", "single-node"),
                ("ELASTIC_PASSWORD", "${ELASTIC_PASSWORD}"),
                ("bootstrap.memory_lock", "true"),
                ("xpack.security.enabled", "true"),
                ("xpack.security.http.ssl.enabled", "true"),
                ("xpack.security.http.ssl.key", "certs/es01/es01.key"),
                ("xpack.security.http.ssl.certificate", "certs/es01/es01.crt"),
                ("xpack.security.http.ssl.certificate_authorities", "certs/ca/ca.crt"),
                ("xpack.security.transport.ssl.enabled", "true"),
                ("xpack.security.transport.ssl.key", "certs/es01/es01.key"),
                ("xpack.security.transport.ssl.certificate", "certs/es01/es01.crt"),
                ("xpack.security.transport.ssl.certificate_authorities", "certs/ca/ca.crt"),
                ("xpack.security.transport.ssl.verification_mode", "certificate"),
                ("xpack.license.self_generated.type", "${LICENSE}"),
            ]),
            mem_limit: Some("${MEM_LIMIT}".to_string()),
            memlock_unlimited: true,
            healthcheck: Some(HealthCheck {
                command: "curl -s --cacert config/certs/ca/ca.crt https://localhost:9200 | grep -q 'missing authentication credentials'".to_string(),
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(10),
                retries: 120,
            }),
            ..Default::default()
        };

        let kibana = ServiceNode {
            name: "kibana".to_string(),
            image: KIBANA_IMAGE.to_string(),
            depends_on: strings(&["es01"]),
            volumes: strings(&[
                KIBANA_CERTS,
                "kibanadata:/usr/share/kibana/data",
            ]),
            ports: strings(&["${KIBANA_PORT}:5601"]),
            environment: env(&[
                ("SERVERNAME", "kibana"),
                ("ELASTICSEARCH_HOSTS", "https://es01:9200"),
                ("ELASTICSEARCH_SERVICEACCOUNTTOKEN", "${ELASTICSEARCH_SERVICE_TOKEN}"),
                ("ELASTICSEARCH_SSL_CERTIFICATEAUTHORITIES", "config/certs/ca/ca.crt"),
            ]),
            mem_limit: Some("${MEM_LIMIT}".to_string()),
            healthcheck: Some(HealthCheck {
                command: "curl -s -I http://localhost:5601 | grep -q 'HTTP/1.1 302 Found'"
                    .to_string(),
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(10),
                retries: 120,
            }),
            ..Default::default()
        };

        Self {
            nodes: vec![setup, es01, kibana],
            volumes: strings(&["esdata01", "kibanadata"]),
        }
    }

    pub fn node(&self, name: &str) -> Option<&ServiceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Checks names are unique, dependencies exist and carry a health check, and
    /// the graph is acyclic.
    pub fn validate(&self) -> Result<(), StackError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(StackError::DuplicateService(node.name.clone()));
            }
        }
        for node in &self.nodes {
            for dep in &node.depends_on {
                let target = self.node(dep).ok_or_else(|| StackError::UnknownDependency {
                    service: node.name.clone(),
                    dependency: dep.clone(),
                })?;
                if target.healthcheck.is_none() {
                    return Err(StackError::UngatedDependency {
                        service: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.startup_order().map(|_| ())
    }

    /// Start order in which every service follows its dependencies. Ties keep
    /// declaration order.
    pub fn startup_order(&self) -> Result<Vec<&str>, StackError> {
        let mut order: Vec<&str> = Vec::with_capacity(self.nodes.len());
        let mut pending: Vec<&ServiceNode> = self.nodes.iter().collect();

        while !pending.is_empty() {
            let ready = pending.iter().position(|node| {
                node.depends_on
                    .iter()
                    .all(|dep| order.contains(&dep.as_str()) || self.node(dep).is_none())
            });
            match ready {
                Some(i) => order.push(pending.remove(i).name.as_str()),
                None => {
                    return Err(StackError::Cycle(
                        pending.iter().map(|n| n.name.clone()).collect(),
                    ))
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stack_starts_setup_first() {
        let stack = StackSpec::default_stack();
        stack.validate().unwrap();
        assert_eq!(stack.startup_order().unwrap(), vec!["setup", "es01", "kibana"]);
    }

    #[test]
    fn order_ignores_declaration_order() {
        let mut stack = StackSpec::default_stack();
        stack.nodes.reverse();
        assert_eq!(stack.startup_order().unwrap(), vec!["setup", "es01", "kibana"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut stack = StackSpec::default_stack();
        stack.nodes[0].depends_on.push("kibana".to_string());
        match stack.validate() {
            Err(StackError::Cycle(names)) => {
                assert_eq!(names, vec!["setup", "es01", "kibana"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut stack = StackSpec::default_stack();
        stack.nodes[2].depends_on.push("fleet".to_string());
        assert!(matches!(
            stack.validate(),
            Err(StackError::UnknownDependency { ref dependency, .. }) if dependency == "fleet"
        ));
    }

    #[test]
    fn dependency_without_health_check_is_rejected() {
        let mut stack = StackSpec::default_stack();
        stack.nodes[1].healthcheck = None;
        assert!(matches!(
            stack.validate(),
            Err(StackError::UngatedDependency { ref dependency, .. }) if dependency == "es01"
        ));
    }

    #[test]
    fn health_checks_retry_about_120_times() {
        let stack = StackSpec::default_stack();
        for node in &stack.nodes {
            let check = node.healthcheck.as_ref().unwrap();
            assert_eq!(check.retries, 120);
            assert!(check.interval >= Duration::from_secs(1));
            assert!(check.interval <= Duration::from_secs(10));
        }
    }
}
