//! Flat `KEY=VALUE` file handling.
//!
//! The file is kept as its original lines so a single key can be rewritten
//! (token substitution) without disturbing comments, ordering or blank lines.

use super::ConfigError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Splits one line into `(key, value)`.
///
/// Returns `None` for comments, blank lines, lines without `=` and lines whose
/// key is empty. The value is the literal text after the first `=`.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    if line.trim_start().starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}

/// A configuration file loaded line by line.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl EnvFile {
    /// Reads the file. A missing file is [`ConfigError::Missing`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::parse(path, &text);
        debug!(path = %path.display(), entries = file.entries().len(), "Loaded configuration file");
        Ok(file)
    }

    /// Builds an `EnvFile` from text without touching the filesystem.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order, duplicates included.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        self.lines.iter().filter_map(|line| parse_line(line)).collect()
    }

    /// Value of `key`. When a key repeats, the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .into_iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Entries folded into a map (last occurrence wins).
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Rewrites every `key=...` line to `key=value`, or appends one if absent.
    pub fn set(&mut self, key: &str, value: &str) {
        let replacement = format!("{key}={value}");
        let mut replaced = false;
        for line in self.lines.iter_mut() {
            if parse_line(line).is_some_and(|(k, _)| k == key) {
                *line = replacement.clone();
                replaced = true;
            }
        }
        if !replaced {
            self.lines.push(replacement);
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Writes the file back atomically: temp file in the same directory, then rename.
    /// The original file's mode carries over.
    pub fn persist(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp, self.render()).map_err(io_err)?;
        // The rename must not widen access to the secrets the file holds.
        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(&tmp, meta.permissions()).map_err(io_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), "Persisted configuration file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_keeps_literal_value_after_first_equals() {
        assert_eq!(parse_line("A=b=c"), Some(("A", "b=c")));
        assert_eq!(parse_line("EMPTY="), Some(("EMPTY", "")));
        assert_eq!(parse_line("SPACED= x "), Some(("SPACED", " x ")));
    }

    #[test]
    fn parse_line_skips_comments_and_malformed_lines() {
        assert_eq!(parse_line("# ELASTIC_PASSWORD=x"), None);
        assert_eq!(parse_line("   # indented comment"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("no separator"), None);
        assert_eq!(parse_line("=orphan"), None);
    }

    #[test]
    fn set_replaces_in_place_and_preserves_other_lines() {
        let mut file = EnvFile::parse(
            "/tmp/.env",
            "# tokens\nELASTICSEARCH_SERVICE_TOKEN=\n\nKIBANA_PORT=5601\n",
        );
        file.set("ELASTICSEARCH_SERVICE_TOKEN", "AAEAAWVs");
        assert_eq!(
            file.render(),
            "# tokens\nELASTICSEARCH_SERVICE_TOKEN=AAEAAWVs\n\nKIBANA_PORT=5601\n"
        );

        file.set("NEW_KEY", "1");
        assert!(file.render().ends_with("KIBANA_PORT=5601\nNEW_KEY=1\n"));
    }

    #[test]
    fn persist_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".env");
        fs::write(&path, "ELASTIC_PASSWORD=changeme\nELASTICSEARCH_SERVICE_TOKEN=\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        let mut file = EnvFile::load(&path).unwrap();
        file.set("ELASTICSEARCH_SERVICE_TOKEN", "AAEAAWVs");
        file.persist().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ELASTIC_PASSWORD=changeme\nELASTICSEARCH_SERVICE_TOKEN=AAEAAWVs\n"
        );
        assert!(!tmp.path().join("..env.tmp").exists());
    }

    #[test]
    fn last_duplicate_wins_on_lookup() {
        let file = EnvFile::parse("/tmp/.env", "ES_PORT=9200\nES_PORT=9201\n");
        assert_eq!(file.get("ES_PORT"), Some("9201"));
        assert_eq!(file.entries().len(), 2);
    }
}
