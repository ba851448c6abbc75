//! Configuration management for vigil.
//!
//! Handles loading and validation of vigil.toml configuration files. All
//! values except the runtime enable toggle are fixed for the process
//! lifetime once applied by [`crate::lifecycle::Controller::initialize`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Enable crash detection (process-wide panic hook)
    #[serde(default = "default_true")]
    pub crash_detection: bool,

    /// Enable hang detection (watchdog thread)
    #[serde(default = "default_true")]
    pub hang_detection: bool,

    /// Hang detection timeout in milliseconds
    #[serde(default = "default_hang_timeout_ms")]
    pub hang_timeout_ms: u64,

    /// Maximum number of capture files to retain (oldest evicted first)
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,

    /// Capture file name prefix
    #[serde(default = "default_log_file_prefix")]
    pub log_file_prefix: String,

    /// Include a device snapshot in captures
    #[serde(default = "default_true")]
    pub include_device_info: bool,

    /// Include an application snapshot in captures
    #[serde(default = "default_true")]
    pub include_app_info: bool,

    /// Include all live thread stacks in hang captures
    #[serde(default = "default_true")]
    pub include_all_threads: bool,

    /// Initial value of the runtime enable toggle
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Capture directory. Defaults to `<data-local-dir>/vigil/crash_logs`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Diagnostic logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crash_detection: true,
            hang_detection: true,
            hang_timeout_ms: default_hang_timeout_ms(),
            max_log_files: default_max_log_files(),
            log_file_prefix: default_log_file_prefix(),
            include_device_info: true,
            include_app_info: true,
            include_all_threads: true,
            enabled: true,
            log_dir: None,
            logging: LogConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_hang_timeout_ms() -> u64 {
    5000
}

fn default_max_log_files() -> usize {
    10
}

fn default_log_file_prefix() -> String {
    "vigil".to_string()
}

impl Config {
    /// Hang detection timeout as a [`Duration`].
    #[must_use]
    pub fn hang_timeout(&self) -> Duration {
        Duration::from_millis(self.hang_timeout_ms)
    }

    /// Capture directory after applying the platform default.
    #[must_use]
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("vigil")
                .join("crash_logs")
        })
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location
    /// (`<config-dir>/vigil/vigil.toml`), falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file path, when a config dir is resolvable.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vigil").join("vigil.toml"))
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hang_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "hang_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_log_files == 0 {
            return Err(ConfigError::Invalid {
                field: "max_log_files",
                reason: "must retain at least one file".to_string(),
            });
        }
        if self.log_file_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_file_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self
            .log_file_prefix
            .contains(|c| c == '/' || c == '\\' || c == '.')
        {
            return Err(ConfigError::Invalid {
                field: "log_file_prefix",
                reason: "must be a bare file name component".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.crash_detection);
        assert!(config.hang_detection);
        assert_eq!(config.hang_timeout_ms, 5000);
        assert_eq!(config.max_log_files, 10);
        assert_eq!(config.log_file_prefix, "vigil");
        assert!(config.enabled);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str("hang_timeout_ms = 250\n").unwrap();
        assert_eq!(config.hang_timeout_ms, 250);
        assert_eq!(config.max_log_files, 10);
        assert!(config.include_all_threads);
    }

    #[test]
    fn toml_round_trip() {
        let config = Config {
            hang_timeout_ms: 1234,
            log_file_prefix: "myapp".to_string(),
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.hang_timeout_ms, 1234);
        assert_eq!(parsed.log_file_prefix, "myapp");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            hang_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let config = Config {
            max_log_files: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn path_like_prefix_is_rejected() {
        let config = Config {
            log_file_prefix: "../escape".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        std::fs::write(&path, "max_log_files = 3\n[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_log_files, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        std::fs::write(&path, "hang_timeout_ms = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
