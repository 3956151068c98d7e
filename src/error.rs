//! Error types
//!
//! [`ScanError`] is local to a single scanner invocation and never escapes
//! the engine: it is folded into an `Unknown` scan result. [`ConfigError`]
//! and [`EngineError`] are the only conditions that fail a whole run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed failure of one scanner invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    /// Feature not applicable on this host (e.g. no discrete GPU)
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Elevation required
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Declared deadline exceeded
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else, with an opaque cause for diagnostics
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl ScanError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScanError::Unsupported(_) => FailureKind::Unsupported,
            ScanError::PermissionDenied(_) => FailureKind::PermissionDenied,
            ScanError::Timeout(_) => FailureKind::Timeout,
            ScanError::Unexpected(_) => FailureKind::Unexpected,
        }
    }

    pub fn unexpected(cause: impl std::fmt::Display) -> Self {
        ScanError::Unexpected(cause.to_string())
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::Unsupported => ScanError::Unsupported(err.to_string()),
            _ => ScanError::Unexpected(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ScanError::Unexpected(format!("scanner panicked: {err}"))
        } else {
            ScanError::Unexpected(format!("scanner task cancelled: {err}"))
        }
    }
}

/// Serializable discriminant of [`ScanError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unsupported,
    PermissionDenied,
    Timeout,
    Unexpected,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Unsupported => "unsupported",
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::Timeout => "timeout",
            FailureKind::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

/// Configuration could not be loaded
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid threshold for '{metric}': {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker pool could not start tasks
    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),
}

/// Failure of a load generator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StressError {
    #[error("load generation unsupported: {0}")]
    Unsupported(String),

    #[error("memory pattern mismatch: {0} corrupted pages")]
    MemoryErrors(u64),

    #[error("load generation failed: {0}")]
    Failed(String),
}
