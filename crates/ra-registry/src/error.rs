//! Error types for registry and marker operations.

use thiserror::Error;

/// Errors that can occur while reading or writing registry data.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A marker or identity file could not be parsed.
    #[error("malformed marker {path}: {reason}")]
    MalformedMarker { path: String, reason: String },

    /// A GUID string was invalid.
    #[error("type error: {0}")]
    Type(#[from] ra_types::TypeError),

    /// I/O error while reading or writing registry files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
