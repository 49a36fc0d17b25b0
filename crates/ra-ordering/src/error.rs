use thiserror::Error;

/// Errors from ordering record operations.
#[derive(Debug, Error)]
pub enum OrderingError {
    /// A name in the list cannot appear in an ordering record.
    #[error("invalid child name in ordering: {0:?}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OrderingResult<T> = Result<T, OrderingError>;
