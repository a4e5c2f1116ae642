//! Error types for the configuration store.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration operation result type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A value rejected by a validator.
///
/// `field` is the dotted path to the offending entry inside a nested
/// document (`tftp.port`, `0.selections.1.os`), empty for top-level values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalid {
    pub message: String,
    pub field: String,
}

impl Invalid {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: String::new(),
        }
    }

    /// Prefix the field path with an enclosing key or index.
    pub fn within(mut self, key: impl fmt::Display) -> Self {
        self.field = if self.field.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", key, self.field)
        };
        self
    }
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl std::error::Error for Invalid {}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A stored or supplied value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Invalid),

    /// The file lock could not be obtained in time
    #[error("Timed out after {timeout:?} waiting for lock on {}", path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// Locking failed for a reason other than contention
    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No entry stored under this name
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The document's top level is not a mapping
    #[error("Configuration in {} is not a mapping: {value}", path.display())]
    Format { path: PathBuf, value: String },

    /// Name is not a declared option of this configuration
    #[error("{kind:?} has no option {name:?}")]
    UnknownOption { kind: &'static str, name: String },

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse or dump error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Temp file could not be moved over the target
    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl ConfigError {
    /// Create a validation error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(Invalid::new(msg))
    }

    /// Create a key-not-found error.
    pub fn key_not_found(name: impl Into<String>) -> Self {
        Self::KeyNotFound(name.into())
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}
