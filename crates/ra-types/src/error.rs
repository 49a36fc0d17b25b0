use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid GUID string: {0}")]
    InvalidGuid(String),

    #[error("invalid object path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("unknown extension kind bits: {0:#x}")]
    UnknownKind(u32),
}
