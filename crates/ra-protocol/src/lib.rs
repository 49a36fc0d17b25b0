//! Wire protocol for the RA connection layer.
//!
//! Every message is framed as `[i32 opcode][i32 length][payload]`. The
//! protocol is strictly synchronous: one request, one response, and no
//! second request until the first has been answered in full. Bulk transfers
//! are streamed as a header response followed by bounded `ArchiveBlock`
//! messages.
//!
//! Responses start with a status byte (`1` success, `0` failure). The rest
//! of the payload is operation specific: NUL-terminated string lists, raw
//! file bytes, or big-endian 32-bit sizes.

pub mod auth;
pub mod codec;
pub mod error;
pub mod message;
pub mod opcode;
pub mod socket;

pub use auth::{Credentials, LoginGreeting, LOGIN_CONFIRMATION};
pub use codec::{FrameCodec, HEADER_LEN};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    decode_size, encode_size, join_strings, split_first_string, split_strings, Message,
    BLOCK_SIZE, DEFAULT_PORT, MAX_MESSAGE_SIZE,
};
pub use opcode::Opcode;
pub use socket::MessageSocket;
