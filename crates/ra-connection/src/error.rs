use thiserror::Error;

/// Errors raised by connection operations.
///
/// Operation-level failures (a missing file, a name already taken) are not
/// errors: they come back as `false` or `None`. Everything here is either a
/// broken transport, a precondition violation, or a capability the backend
/// lacks.
#[derive(Debug, Error)]
pub enum RaError {
    /// Resolve, connect, or login failed. Raised only at construction.
    #[error("cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Framing or sequencing failure; the connection is unusable afterwards.
    #[error("protocol error: {0}")]
    Protocol(#[from] ra_protocol::ProtocolError),

    /// A call on a connection that already hit a protocol error.
    #[error("connection is unusable after an earlier protocol error")]
    Broken,

    /// A malformed path, name, or GUID was passed in.
    #[error("validation error: {0}")]
    Validation(#[from] ra_types::TypeError),

    /// The backend lacks this capability.
    #[error("{0} is not supported by this connection")]
    NotSupported(&'static str),

    /// A recursive operation observed the cancellation flag.
    #[error("operation cancelled")]
    Cancelled,

    #[error("registry error: {0}")]
    Registry(#[from] ra_registry::RegistryError),

    #[error("ordering error: {0}")]
    Ordering(#[from] ra_ordering::OrderingError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RaError {
    /// Whether a caller may fall back to another strategy.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }
}

pub type RaResult<T> = Result<T, RaError>;
