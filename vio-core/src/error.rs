//! Error types for vio.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vio operations.
pub type Result<T> = std::result::Result<T, VioError>;

/// Main error type for vio.
#[derive(Error, Debug)]
pub enum VioError {
    // Address resolution errors
    #[error("Cannot resolve {what}: {reason}")]
    NotFound { what: String, reason: String },

    // Driver binding errors
    #[error("Driver {driver} not available in system")]
    DriverUnavailable { driver: String },

    #[error("VF device {address} not found")]
    DeviceNotFound { address: String },

    #[error("Failed to bind {address} to driver {driver}: {reason}")]
    BindFailed { address: String, driver: String, reason: String },

    // Control plane errors
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Cannot write {value:?} to {path:?}: {source}")]
    WriteFailed {
        path: PathBuf,
        value: String,
        #[source]
        source: std::io::Error,
    },

    // Descriptor errors
    #[error("Invalid descriptor {path:?} (line {line}): {reason}")]
    DescriptorParse { path: PathBuf, line: usize, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VioError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Shorthand for a resolution failure.
    pub fn not_found(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound { what: what.into(), reason: reason.into() }
    }

    /// Whether this is a resolution failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
