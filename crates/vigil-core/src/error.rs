//! Error types for vigil-core

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vigil-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Capture store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Logging initialization errors
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LogError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file could not be parsed as TOML
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    /// A field value failed validation
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Capture store errors.
///
/// These never escape [`crate::store::LogStore::persist`]; they exist so the
/// fallible inner path can report what went wrong to the diagnostic channel.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Log directory could not be created
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Log file could not be written
    #[error("failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No free file name could be found for the event's timestamp
    #[error("too many log files with timestamp {timestamp}")]
    NameExhausted { timestamp: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_with_context() {
        let err = Error::from(ConfigError::Invalid {
            field: "hang_timeout_ms",
            reason: "must be greater than zero".to_string(),
        });
        let rendered = err.to_string();
        assert!(rendered.contains("hang_timeout_ms"));
        assert!(rendered.contains("greater than zero"));
    }

    #[test]
    fn store_error_carries_path() {
        let err = StoreError::CreateDir {
            path: PathBuf::from("/nope/logs"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/nope/logs"));
    }
}
