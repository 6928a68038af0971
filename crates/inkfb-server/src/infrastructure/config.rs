//! TOML-based configuration for the server binary.
//!
//! The file is optional: a missing file yields defaults, and every field has
//! a `#[serde(default = …)]` so old configs keep working when new fields
//! appear. Example:
//!
//! ```toml
//! socket_path = "/tmp/inkfb.sock"
//! backlog = 10
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};

use inkfb_core::SOCKET_PATH;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "INKFB_CONFIG";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/inkfb/config.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Path of the well-known seqpacket endpoint.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Listen backlog of the endpoint.
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(SOCKET_PATH)
}

fn default_backlog() -> i32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            backlog: default_backlog(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Loads the config from a specific file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads from `$INKFB_CONFIG`, then [`DEFAULT_CONFIG_PATH`], then falls
    /// back to defaults when neither file exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: ServerConfig = toml::from_str("log_level = \"debug\"").unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.socket_path, PathBuf::from(SOCKET_PATH));
        assert_eq!(config.backlog, 10);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = ServerConfig {
            socket_path: PathBuf::from("/run/inkfb/test.sock"),
            backlog: 3,
            log_level: "trace".to_string(),
        };
        let text = toml::to_string(&config).unwrap();
        let back: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "backlog = \"many\"").unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
