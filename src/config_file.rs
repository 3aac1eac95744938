//! Configuration store for the peer process
//!
//! Values come from three layers, highest precedence first: explicit overrides
//! (usually bound from command-line flags), `CORE_*` environment variables, and the
//! `core.yaml` configuration file. Keys are dotted paths such as `peer.address` and
//! are matched case-insensitively.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_yaml::Value;
use thiserror::Error;

/// Base name of the configuration file, and the environment variable prefix
pub const CMD_ROOT: &str = "core";

/// Environment variable holding an alternative configuration directory
pub const CFG_PATH_VAR: &str = "PEER_CFG_PATH";

/// Errors that can occur while loading or reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No core config file found in: {}", display_dirs(.0))]
    ConfigNotFound(Vec<PathBuf>),
    #[error("Unable to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to parse YAML config file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON config file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Missing required config value: {0}")]
    MissingKey(String),
    #[error("Invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

fn display_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// List of supported configuration file names, in lookup order
const FILENAMES: [&str; 3] = ["core.yaml", "core.yml", "core.json"];

/// Directories searched for the configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        SearchPath { dirs }
    }

    /// `$PEER_CFG_PATH` when set, otherwise the current directory.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_override(std::env::var(CFG_PATH_VAR).ok())
    }

    /// A user-defined directory replaces the default search path entirely.
    #[must_use]
    pub fn from_override(alternative: Option<String>) -> Self {
        match alternative.filter(|p| !p.is_empty()) {
            Some(path) => {
                info!("User defined config file path: {path}");
                SearchPath::new(vec![PathBuf::from(path)])
            }
            None => SearchPath::new(vec![PathBuf::from("./")]),
        }
    }

    /// Append a further directory to search after the existing ones.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.push(dir.into());
        self
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the first configuration file found, searching directories in order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if no directory holds a config file.
    pub fn find(&self) -> Result<PathBuf, ConfigError> {
        for dir in &self.dirs {
            debug!("Searching for config file in {}", dir.display());
            for file in &FILENAMES {
                let path = dir.join(file);
                if path.is_file() {
                    info!("Found config file: {}", path.display());
                    return Ok(path);
                }
            }
        }
        Err(ConfigError::ConfigNotFound(self.dirs.clone()))
    }
}

/// Layered, read-mostly configuration lookup
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    file: Value,
    env: HashMap<String, String>,
    overrides: HashMap<String, String>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Wrap an already parsed document.
    #[must_use]
    pub fn from_value(file: Value) -> Self {
        ConfigStore {
            file,
            ..Default::default()
        }
    }

    /// Loads and parses a configuration file, JSON or YAML by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<ConfigStore, ConfigError> {
        let contents = std::fs::read_to_string(file).map_err(|e| ConfigError::Read {
            path: file.to_path_buf(),
            source: e,
        })?;
        let value: Value = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(ConfigStore {
            path: Some(file.to_path_buf()),
            ..ConfigStore::from_value(value)
        })
    }

    /// Find the configuration file on `search` and load it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` when no file exists on the search path,
    /// or any error from [`ConfigStore::from_file`].
    pub fn load(search: &SearchPath) -> Result<ConfigStore, ConfigError> {
        Self::from_file(&search.find()?)
    }

    /// Capture the `CORE_*` variables from an environment listing.
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let prefix = format!("{}_", CMD_ROOT.to_uppercase());
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(&prefix))
            .collect();
        self
    }

    /// Bind an explicit value for `key`, taking precedence over every other layer.
    pub fn set_override(&mut self, key: &str, value: impl Into<String>) {
        self.overrides.insert(key.to_lowercase(), value.into());
    }

    /// The file this store was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Name of the environment variable overriding `key`: `peer.address` -> `CORE_PEER_ADDRESS`.
    #[must_use]
    pub fn env_key(key: &str) -> String {
        format!("{CMD_ROOT}_{}", key.replace('.', "_")).to_uppercase()
    }

    /// The value from the configuration file only, without overrides.
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.file, |node, segment| {
            let Value::Mapping(map) = node else {
                return None;
            };
            map.iter()
                .find(|(k, _)| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(segment)))
                .map(|(_, v)| v)
        })
    }

    /// String value of `key` after applying overrides and the environment.
    ///
    /// Scalars are rendered as strings; mappings and sequences are not strings and
    /// resolve to `None`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(&key.to_lowercase()) {
            return Some(value.clone());
        }
        if let Some(value) = self.env.get(&Self::env_key(key)) {
            return Some(value.clone());
        }
        match self.get_value(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean value of `key`, accepting `1/t/true/0/f/false` in any case.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the value is not a boolean.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(raw) = self.get_str(key) else {
            return Ok(None);
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "t" | "true" => Ok(Some(true)),
            "0" | "f" | "false" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    /// Integer value of `key`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the value is not an integer.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        let Some(raw) = self.get_str(key) else {
            return Ok(None);
        };
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
    }

    /// Like [`ConfigStore::get_str`], failing when the key is absent or empty.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if no layer provides a non-empty value.
    pub fn require_str(&self, key: &str) -> Result<String, ConfigError> {
        self.get_str(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
peer:
  id: jdoe
  address: 0.0.0.0:7051
  fileSystemPath: /var/hyperledger/production
  gomaxprocs: -1
security:
  enabled: false
logging:
  node: info
  network: warning
";

    fn sample() -> ConfigStore {
        ConfigStore::from_value(serde_yaml::from_str(SAMPLE).unwrap())
    }

    #[test]
    fn test_from_file_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ConfigStore::from_file(&path).unwrap();
        assert_eq!(config.get_str("peer.id").as_deref(), Some("jdoe"));
        assert_eq!(config.path(), Some(path.as_path()));
    }

    #[test]
    fn test_from_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        std::fs::write(&path, r#"{"peer": {"address": "10.0.0.1:7051"}}"#).unwrap();
        let config = ConfigStore::from_file(&path).unwrap();
        assert_eq!(
            config.get_str("peer.address").as_deref(),
            Some("10.0.0.1:7051")
        );
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.yaml");
        std::fs::write(&path, "peer: [unclosed").unwrap();
        match ConfigStore::from_file(&path) {
            Err(ConfigError::Yaml { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected Yaml error, got: {other:?}"),
        }
    }

    #[test]
    fn test_search_path_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("core.yml"), SAMPLE).unwrap();
        let search = SearchPath::new(vec![first.path().to_path_buf()]).with_dir(second.path());
        assert_eq!(search.find().unwrap(), second.path().join("core.yml"));

        std::fs::write(first.path().join("core.json"), "{}").unwrap();
        assert_eq!(search.find().unwrap(), first.path().join("core.json"));
    }

    #[test]
    fn test_search_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let search = SearchPath::new(vec![dir.path().to_path_buf()]);
        match search.find() {
            Err(ConfigError::ConfigNotFound(dirs)) => assert_eq!(dirs, [dir.path()]),
            other => panic!("Expected ConfigNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_search_path_override_replaces_default() {
        assert_eq!(SearchPath::from_override(None).dirs(), [PathBuf::from("./")]);
        assert_eq!(
            SearchPath::from_override(Some(String::new())).dirs(),
            [PathBuf::from("./")]
        );
        assert_eq!(
            SearchPath::from_override(Some("/etc/peer".to_string())).dirs(),
            [PathBuf::from("/etc/peer")]
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let config = sample();
        assert_eq!(
            config.get_str("peer.filesystempath").as_deref(),
            Some("/var/hyperledger/production")
        );
        assert_eq!(config.get_str("PEER.ID").as_deref(), Some("jdoe"));
        assert_eq!(config.get_str("peer.missing"), None);
        assert_eq!(config.get_str("peer"), None);
        assert!(config.get_value("peer").is_some_and(Value::is_mapping));
    }

    #[test]
    fn test_precedence_override_env_file() {
        let mut config = sample().with_environment([
            ("CORE_PEER_ID", "from-env"),
            ("CORE_LOGGING_NODE", "debug"),
            ("HOME", "/root"),
        ]);
        assert_eq!(config.get_str("peer.id").as_deref(), Some("from-env"));
        assert_eq!(config.get_str("logging.node").as_deref(), Some("debug"));

        config.set_override("peer.id", "from-flag");
        assert_eq!(config.get_str("peer.id").as_deref(), Some("from-flag"));
        assert_eq!(config.get_str("Peer.Id").as_deref(), Some("from-flag"));
    }

    #[test]
    fn test_env_key() {
        assert_eq!(ConfigStore::env_key("peer.address"), "CORE_PEER_ADDRESS");
        assert_eq!(ConfigStore::env_key("logging_level"), "CORE_LOGGING_LEVEL");
    }

    #[test]
    fn test_typed_getters() {
        let config = sample().with_environment([("CORE_SECURITY_ENABLED", "T")]);
        assert_eq!(config.get_bool("security.enabled").unwrap(), Some(true));
        assert_eq!(config.get_int("peer.gomaxprocs").unwrap(), Some(-1));
        assert_eq!(config.get_bool("missing").unwrap(), None);
        assert!(matches!(
            config.get_int("peer.id"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.get_bool("peer.id"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_require_str() {
        let mut config = sample();
        assert_eq!(config.require_str("peer.id").unwrap(), "jdoe");
        config.set_override("peer.id", " ");
        match config.require_str("peer.id") {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "peer.id"),
            other => panic!("Expected MissingKey, got: {other:?}"),
        }
    }
}
