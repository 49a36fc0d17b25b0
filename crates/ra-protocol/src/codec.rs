use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MAX_MESSAGE_SIZE};
use crate::opcode::Opcode;

/// Size of the frame header: opcode + payload length.
pub const HEADER_LEN: usize = 8;

/// Codec for RA protocol frames.
///
/// Frame layout: `[4 bytes opcode (i32 BE)][4 bytes length (i32 BE)][payload]`.
pub struct FrameCodec;

impl FrameCodec {
    /// Append the framed message to `buf`.
    pub fn encode(msg: &Message, buf: &mut BytesMut) -> ProtocolResult<()> {
        let len = msg.payload.len();
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        buf.reserve(HEADER_LEN + len);
        buf.put_i32(msg.opcode.code());
        buf.put_i32(len as i32);
        buf.put_slice(&msg.payload);
        Ok(())
    }

    /// Encode a single message into a fresh buffer.
    pub fn encode_to_vec(msg: &Message) -> ProtocolResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        Self::encode(msg, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the frame is incomplete; consumed bytes are
    /// removed from `buf` only once a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> ProtocolResult<Option<Message>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = &buf[..HEADER_LEN];
        let code = header.get_i32();
        let len = header.get_i32();
        if len < 0 {
            return Err(ProtocolError::FramingError(format!(
                "negative payload length {len}"
            )));
        }
        let len = len as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let opcode = Opcode::from_code(code)?;
        if buf.len() < HEADER_LEN + len {
            buf.reserve(HEADER_LEN + len - buf.len());
            return Ok(None);
        }
        buf.advance(HEADER_LEN);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Message { opcode, payload }))
    }
}
