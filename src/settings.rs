//! Settings cached once at startup by the root setup hook

use std::path::PathBuf;

use log::debug;

use crate::config_file::{ConfigError, ConfigStore};

/// Data directory used when `peer.fileSystemPath` is not configured
pub const DEFAULT_FILE_SYSTEM_PATH: &str = "/var/hyperledger/production";

/// Configuration values read on every command, resolved up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSettings {
    pub peer_address: String,
    pub peer_id: Option<String>,
    pub security_enabled: bool,
    pub file_system_path: PathBuf,
}

impl CachedSettings {
    /// Read and validate the cached keys.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` when `peer.address` is absent, and
    /// `ConfigError::InvalidValue` when it is not `host:port` or when
    /// `security.enabled` is not a boolean.
    pub fn from_config(config: &ConfigStore) -> Result<Self, ConfigError> {
        let peer_address = config.require_str("peer.address")?;
        validate_address("peer.address", &peer_address)?;

        let settings = CachedSettings {
            peer_address,
            peer_id: config.get_str("peer.id").filter(|id| !id.is_empty()),
            security_enabled: config.get_bool("security.enabled")?.unwrap_or(false),
            file_system_path: config
                .get_str("peer.fileSystemPath")
                .filter(|p| !p.is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_FILE_SYSTEM_PATH), PathBuf::from),
        };
        debug!("Cached configuration: {settings:?}");
        Ok(settings)
    }

    /// Location of the pid file written by a running node.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.file_system_path.join("peer.pid")
    }
}

fn validate_address(key: &str, address: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: address.to_string(),
        reason: reason.to_string(),
    };
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid("port must be a number between 0 and 65535"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(yaml: &str) -> ConfigStore {
        ConfigStore::from_value(serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_cache_reads_all_keys() {
        let config = store(
            "peer:\n  id: vp0\n  address: 0.0.0.0:7051\n  fileSystemPath: /tmp/peer\nsecurity:\n  enabled: true\n",
        );
        let settings = CachedSettings::from_config(&config).unwrap();
        assert_eq!(settings.peer_address, "0.0.0.0:7051");
        assert_eq!(settings.peer_id.as_deref(), Some("vp0"));
        assert!(settings.security_enabled);
        assert_eq!(settings.pid_file(), PathBuf::from("/tmp/peer/peer.pid"));
    }

    #[test]
    fn test_defaults_for_optional_keys() {
        let settings = CachedSettings::from_config(&store("peer:\n  address: localhost:7051\n"))
            .unwrap();
        assert_eq!(settings.peer_id, None);
        assert!(!settings.security_enabled);
        assert_eq!(
            settings.file_system_path,
            PathBuf::from(DEFAULT_FILE_SYSTEM_PATH)
        );
    }

    #[test]
    fn test_missing_address() {
        match CachedSettings::from_config(&store("peer:\n  id: vp0\n")) {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "peer.address"),
            other => panic!("Expected MissingKey, got: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_address() {
        for address in ["localhost", ":7051", "localhost:port", "localhost:70510"] {
            let config = ConfigStore::default()
                .with_environment([("CORE_PEER_ADDRESS", address)]);
            assert!(
                matches!(
                    CachedSettings::from_config(&config),
                    Err(ConfigError::InvalidValue { .. })
                ),
                "address {address} should be rejected"
            );
        }
    }
}
