use thiserror::Error;

use crate::opcode::Opcode;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown opcode: {0}")]
    UnknownOpcode(i32),

    #[error("unexpected opcode: expected {expected}, got {actual}")]
    UnexpectedOpcode { expected: Opcode, actual: Opcode },

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
