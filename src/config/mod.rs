//! # Configuration
//!
//! The stack is configured by one flat `KEY=VALUE` file (conventionally `.env`), shared
//! with the container runtime, which resolves the `${VAR}` references of the rendered
//! compose document from the same file.
//!
//! [`StackConfig::load`] parses it once into an immutable typed record that is passed
//! explicitly to every step. Loading is all-or-nothing: a missing file or an empty
//! required secret fails before any other work happens.

pub mod env_file;
pub mod error;

pub use env_file::{parse_line, EnvFile};
pub use error::ConfigError;

use probe_framework::{Backoff, RetryPolicy};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ELASTIC_PASSWORD: &str = "ELASTIC_PASSWORD";
pub const KIBANA_PASSWORD: &str = "KIBANA_PASSWORD";
pub const SERVICE_TOKEN_KEY: &str = "ELASTICSEARCH_SERVICE_TOKEN";

/// Upper bound for exponential backoff delays.
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// A credential whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Numeric owner applied to the certificate tree, written `uid:gid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl FromStr for Ownership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (uid, gid) = s
            .split_once(':')
            .ok_or_else(|| format!("expected uid:gid, got {s:?}"))?;
        Ok(Self {
            uid: uid.trim().parse().map_err(|e| format!("uid: {e}"))?,
            gid: gid.trim().parse().map_err(|e| format!("gid: {e}"))?,
        })
    }
}

/// Retry knobs for the two waiting callers.
///
/// The setup sequence and the provisioning sequence poll at different intervals
/// but share the attempt cap, deadline and backoff factor.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub setup_interval: Duration,
    pub provision_interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub backoff_factor: f64,
}

impl PollSettings {
    pub fn setup_policy(&self) -> RetryPolicy {
        self.policy(self.setup_interval)
    }

    pub fn provision_policy(&self) -> RetryPolicy {
        self.policy(self.provision_interval)
    }

    fn policy(&self, interval: Duration) -> RetryPolicy {
        let mut policy = RetryPolicy::fixed(interval);
        if let Some(max) = self.max_attempts {
            policy = policy.with_max_attempts(max);
        }
        if let Some(deadline) = self.deadline {
            policy = policy.with_deadline(deadline);
        }
        if self.backoff_factor > 1.0 {
            policy = policy.with_backoff(Backoff::Exponential {
                factor: self.backoff_factor,
                max: BACKOFF_CAP,
            });
        }
        policy
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            setup_interval: Duration::from_secs(30),
            provision_interval: Duration::from_secs(5),
            max_attempts: Some(120),
            deadline: None,
            backoff_factor: 1.0,
        }
    }
}

/// The typed configuration record.
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub elastic_user: String,
    pub elastic_password: Secret,
    pub kibana_password: Secret,
    pub kibana_system_user: String,
    pub stack_version: String,
    pub cluster_name: String,
    pub license: String,
    pub es_port: u16,
    pub kibana_port: u16,
    pub mem_limit: u64,
    pub certs_dir: PathBuf,
    /// Base URL of the search engine, without trailing slash.
    pub es_url: String,
    pub es_container: String,
    pub certutil_bin: PathBuf,
    pub certs_owner: Ownership,
    pub poll: PollSettings,
    pub request_timeout: Duration,
    pub service_token: Option<Secret>,
}

impl StackConfig {
    /// Loads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = EnvFile::load(path)?;
        Self::from_env_file(&file)
    }

    pub fn from_env_file(file: &EnvFile) -> Result<Self, ConfigError> {
        // Secrets first: nothing else matters if they are missing.
        let elastic_password = required_secret(file, ELASTIC_PASSWORD)?;
        let kibana_password = required_secret(file, KIBANA_PASSWORD)?;

        let es_port: u16 = parsed(file, "ES_PORT", 9200)?;
        let es_url = match setting(file, "ES_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://localhost:{es_port}"),
        };
        reqwest::Url::parse(&es_url).map_err(|e| ConfigError::invalid("ES_URL", e.to_string()))?;

        let backoff_factor: f64 = parsed(file, "POLL_BACKOFF_FACTOR", 1.0)?;
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(ConfigError::invalid(
                "POLL_BACKOFF_FACTOR",
                format!("must be >= 1, got {backoff_factor}"),
            ));
        }

        let max_attempts: u32 = parsed(file, "POLL_MAX_ATTEMPTS", 120)?;
        let deadline_secs: u64 = parsed(file, "POLL_DEADLINE_SECS", 0)?;
        let poll = PollSettings {
            setup_interval: Duration::from_secs(parsed(file, "SETUP_POLL_INTERVAL_SECS", 30)?),
            provision_interval: Duration::from_secs(parsed(
                file,
                "PROVISION_POLL_INTERVAL_SECS",
                5,
            )?),
            max_attempts: (max_attempts > 0).then_some(max_attempts),
            deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
            backoff_factor,
        };

        let certs_owner = match setting(file, "CERTS_OWNER") {
            Some(raw) => raw
                .parse::<Ownership>()
                .map_err(|reason| ConfigError::invalid("CERTS_OWNER", reason))?,
            None => Ownership { uid: 0, gid: 0 },
        };

        let certs_dir = PathBuf::from(text(file, "CERTS_DIR", "./certs"));
        if !is_bind_path(&certs_dir) {
            return Err(ConfigError::invalid(
                "CERTS_DIR",
                format!("{} must be absolute or start with ./ to be bind-mounted", certs_dir.display()),
            ));
        }

        Ok(Self {
            elastic_user: text(file, "ES_USERNAME", "elastic"),
            elastic_password,
            kibana_password,
            kibana_system_user: text(file, "KIBANA_SYSTEM_USER", "kibana_system"),
            stack_version: text(file, "STACK_VERSION", "8.15.0"),
            cluster_name: text(file, "CLUSTER_NAME", "docker-cluster"),
            license: text(file, "LICENSE", "basic"),
            es_port,
            kibana_port: parsed(file, "KIBANA_PORT", 5601)?,
            mem_limit: parsed(file, "MEM_LIMIT", 1_073_741_824)?,
            certs_dir,
            es_url,
            es_container: text(file, "ES_CONTAINER", "es01"),
            certutil_bin: PathBuf::from(text(file, "CERTUTIL_BIN", "bin/elasticsearch-certutil")),
            certs_owner,
            poll,
            request_timeout: Duration::from_secs(parsed(file, "REQUEST_TIMEOUT_SECS", 10)?),
            service_token: setting(file, SERVICE_TOKEN_KEY).map(Secret::new),
        })
    }

    /// CA certificate the HTTP client pins once certificates exist.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.certs_dir.join("ca").join("ca.crt")
    }

    /// Applies command-line overrides on top of the file's values.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(dir) = overrides.certs_dir {
            self.certs_dir = dir;
        }
        if let Some(url) = overrides.es_url {
            let url = url.trim_end_matches('/').to_string();
            reqwest::Url::parse(&url).map_err(|e| ConfigError::invalid("ES_URL", e.to_string()))?;
            self.es_url = url;
        }
        Ok(self)
    }
}

/// Settings the command line may override. The setup container, for one, reaches
/// the engine by service name and keeps certificates under its own config dir.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub certs_dir: Option<PathBuf>,
    pub es_url: Option<String>,
}

/// The compose runtime treats a volume source as a host path only when it is
/// absolute or starts with `.`; anything else names a volume.
fn is_bind_path(path: &Path) -> bool {
    matches!(
        path.components().next(),
        Some(Component::RootDir | Component::CurDir | Component::ParentDir)
    )
}

fn required_secret(file: &EnvFile, key: &'static str) -> Result<Secret, ConfigError> {
    file.get(key)
        .filter(|v| !v.is_empty())
        .map(Secret::new)
        .ok_or(ConfigError::MissingSecret(key))
}

fn setting<'a>(file: &'a EnvFile, key: &str) -> Option<&'a str> {
    file.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn text(file: &EnvFile, key: &str, default: &str) -> String {
    setting(file, key).unwrap_or(default).to_string()
}

fn parsed<T>(file: &EnvFile, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match setting(file, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Result<StackConfig, ConfigError> {
        StackConfig::from_env_file(&EnvFile::parse("/tmp/.env", text))
    }

    #[test]
    fn defaults_fill_unset_keys() {
        let cfg = config("ELASTIC_PASSWORD=changeme\nKIBANA_PASSWORD=kibana\n").unwrap();
        assert_eq!(cfg.elastic_user, "elastic");
        assert_eq!(cfg.kibana_system_user, "kibana_system");
        assert_eq!(cfg.es_url, "https://localhost:9200");
        assert_eq!(cfg.poll.setup_interval, Duration::from_secs(30));
        assert_eq!(cfg.poll.provision_interval, Duration::from_secs(5));
        assert_eq!(cfg.poll.max_attempts, Some(120));
        assert_eq!(cfg.certs_owner, Ownership { uid: 0, gid: 0 });
        assert_eq!(cfg.ca_cert_path(), PathBuf::from("./certs/ca/ca.crt"));
        assert!(cfg.service_token.is_none());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = config("ELASTIC_PASSWORD=\nKIBANA_PASSWORD=kibana\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(ELASTIC_PASSWORD)));

        let err = config("ELASTIC_PASSWORD=x\n# KIBANA_PASSWORD=commented\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret(KIBANA_PASSWORD)));
    }

    #[test]
    fn es_url_follows_port_and_drops_trailing_slash() {
        let cfg = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nES_PORT=9400\n").unwrap();
        assert_eq!(cfg.es_url, "https://localhost:9400");

        let cfg = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nES_URL=https://es01:9200/\n")
            .unwrap();
        assert_eq!(cfg.es_url, "https://es01:9200");
    }

    #[test]
    fn invalid_numbers_name_the_key() {
        let err = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nES_PORT=http\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ES_PORT", .. }));

        let err =
            config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nPOLL_BACKOFF_FACTOR=0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "POLL_BACKOFF_FACTOR", .. }));
    }

    #[test]
    fn certs_dir_must_be_a_bind_path() {
        let err = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nCERTS_DIR=certs\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CERTS_DIR", .. }));

        for dir in ["./certs", "../shared/certs", "/srv/certs"] {
            let cfg = config(&format!("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nCERTS_DIR={dir}\n"))
                .unwrap();
            assert_eq!(cfg.certs_dir, PathBuf::from(dir));
        }
    }

    #[test]
    fn zero_attempt_cap_means_unbounded() {
        let cfg = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\nPOLL_MAX_ATTEMPTS=0\n").unwrap();
        assert!(cfg.poll.setup_policy().is_unbounded());
    }

    #[test]
    fn overrides_replace_file_values() {
        let cfg = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\n")
            .unwrap()
            .with_overrides(Overrides {
                certs_dir: Some(PathBuf::from("config/certs")),
                es_url: Some("https://es01:9200/".to_string()),
            })
            .unwrap();
        assert_eq!(cfg.es_url, "https://es01:9200");
        assert_eq!(cfg.ca_cert_path(), PathBuf::from("config/certs/ca/ca.crt"));

        let err = config("ELASTIC_PASSWORD=a\nKIBANA_PASSWORD=b\n")
            .unwrap()
            .with_overrides(Overrides {
                es_url: Some("not a url".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ES_URL", .. }));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let cfg = config("ELASTIC_PASSWORD=hunter2\nKIBANA_PASSWORD=kibana\n").unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("Secret(***)"));
    }
}
