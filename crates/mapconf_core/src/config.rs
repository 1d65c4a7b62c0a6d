//! Store configuration file.
//!
//! # Responsibility
//! - Describe where the store file lives and how logging is set up.
//! - Load that description from TOML.
//!
//! # Example
//!
//! ```toml
//! [storage]
//! path = "/var/lib/mapconf"
//! db_file = "mapconf.sqlite"
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/mapconf"
//! ```

use crate::logging::default_log_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILE: &str = "mapconf.sqlite";

/// Errors from loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config file `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                message,
            } => write!(f, "failed to parse config file `{}`: {message}", path.display()),
            Self::Parse {
                path: None,
                message,
            } => write!(f, "failed to parse config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { .. } => None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the store file.
    pub path: PathBuf,
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; build-mode default when unset.
    pub level: Option<String>,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Reads and parses a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            message: err.to_string(),
        })
    }

    /// Parses TOML config text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|err| ConfigError::Parse {
            path: None,
            message: err.to_string(),
        })
    }

    /// Full path of the SQLite store file.
    pub fn db_path(&self) -> PathBuf {
        self.storage.path.join(&self.storage.db_file)
    }

    /// Configured log level, falling back to the build-mode default.
    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(default_log_level())
    }
}

fn default_db_file() -> String {
    DEFAULT_DB_FILE.to_string()
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};
    use std::path::PathBuf;

    #[test]
    fn parses_full_config() {
        let config = StoreConfig::from_toml_str(
            r#"
            [storage]
            path = "/srv/mapconf"
            db_file = "conf.sqlite"

            [logging]
            level = "warn"
            dir = "/var/log/mapconf"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path(), PathBuf::from("/srv/mapconf/conf.sqlite"));
        assert_eq!(config.log_level(), "warn");
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/mapconf")));
    }

    #[test]
    fn applies_defaults() {
        let config = StoreConfig::from_toml_str("[storage]\npath = \"/tmp/store\"\n").unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/store/mapconf.sqlite"));
        assert!(config.logging.dir.is_none());
        assert!(!config.log_level().is_empty());
    }

    #[test]
    fn rejects_missing_storage_and_unknown_keys() {
        assert!(matches!(
            StoreConfig::from_toml_str("[logging]\nlevel = \"info\"\n"),
            Err(ConfigError::Parse { path: None, .. })
        ));
        assert!(StoreConfig::from_toml_str("[storage]\npath = \"/x\"\nport = 8080\n").is_err());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
