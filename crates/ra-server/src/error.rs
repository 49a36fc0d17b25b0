use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ra_protocol::ProtocolError),

    #[error("store error: {0}")]
    Connection(#[from] ra_connection::RaError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Whether the session can answer `fail` and keep going.
    ///
    /// Store-side failures and malformed request bodies leave the framing
    /// intact; anything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Protocol(ra_protocol::ProtocolError::MalformedPayload(_))
                | Self::Protocol(ra_protocol::ProtocolError::MessageTooLarge { .. })
        )
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
