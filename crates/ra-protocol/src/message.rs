use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};
use crate::opcode::Opcode;

/// Largest payload accepted in a single frame.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Payload size of one streamed block.
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Well-known server port.
pub const DEFAULT_PORT: u16 = 4401;

const STATUS_OK: u8 = 1;
const STATUS_FAIL: u8 = 0;

/// One protocol message: an opcode and an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Message {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    pub fn empty(opcode: Opcode) -> Self {
        Self::new(opcode, Bytes::new())
    }

    /// Request whose payload is a NUL-terminated string list.
    pub fn with_strings(opcode: Opcode, fields: &[&str]) -> Self {
        Self::new(opcode, join_strings(fields))
    }

    /// Successful response carrying `body` after the status byte.
    pub fn ok(opcode: Opcode, body: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(STATUS_OK);
        buf.put_slice(body);
        Self::new(opcode, buf.freeze())
    }

    /// Successful response whose body is a string list.
    pub fn ok_strings(opcode: Opcode, fields: &[&str]) -> Self {
        Self::ok(opcode, &join_strings(fields))
    }

    /// Failed response. Carries no body.
    pub fn fail(opcode: Opcode) -> Self {
        Self::new(opcode, Bytes::from_static(&[STATUS_FAIL]))
    }

    /// Split a response payload into its status flag and body.
    pub fn status(&self) -> ProtocolResult<(bool, &[u8])> {
        match self.payload.split_first() {
            Some((&STATUS_OK, body)) => Ok((true, body)),
            Some((&STATUS_FAIL, body)) => Ok((false, body)),
            Some((other, _)) => Err(ProtocolError::MalformedPayload(format!(
                "invalid status byte {other} in {} response",
                self.opcode
            ))),
            None => Err(ProtocolError::MalformedPayload(format!(
                "empty {} response",
                self.opcode
            ))),
        }
    }

    /// The payload as a string list.
    pub fn strings(&self) -> ProtocolResult<Vec<String>> {
        split_strings(&self.payload)
    }
}

/// Encode strings as a list of NUL-terminated UTF-8 fields.
pub fn join_strings(fields: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for field in fields {
        out.extend_from_slice(field.as_bytes());
        out.push(0);
    }
    out
}

/// Decode a list produced by [`join_strings`].
pub fn split_strings(data: &[u8]) -> ProtocolResult<Vec<String>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let body = data
        .strip_suffix(&[0])
        .ok_or_else(|| ProtocolError::MalformedPayload("string list not NUL-terminated".into()))?;
    body.split(|&b| b == 0)
        .map(|field| {
            String::from_utf8(field.to_vec())
                .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
        })
        .collect()
}

/// Split off the first NUL-terminated field, returning it and the rest.
pub fn split_first_string(data: &[u8]) -> ProtocolResult<(String, &[u8])> {
    let idx = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ProtocolError::MalformedPayload("missing NUL terminator".into()))?;
    let field = String::from_utf8(data[..idx].to_vec())
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?;
    Ok((field, &data[idx + 1..]))
}

/// Encode a 32-bit size field.
pub fn encode_size(size: u32) -> [u8; 4] {
    size.to_be_bytes()
}

/// Decode a 32-bit size field from the start of `data`.
pub fn decode_size(data: &[u8]) -> ProtocolResult<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(ProtocolError::MalformedPayload(format!(
            "size field needs 4 bytes, have {}",
            data.len()
        )));
    }
    let (head, rest) = data.split_at(4);
    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    Ok((size, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        let ok = Message::ok(Opcode::FetchFile, b"data");
        assert_eq!(ok.status().unwrap(), (true, &b"data"[..]));
        let fail = Message::fail(Opcode::FetchFile);
        assert_eq!(fail.status().unwrap(), (false, &b""[..]));
    }

    #[test]
    fn bad_status_rejected() {
        let msg = Message::new(Opcode::Unlink, vec![7u8]);
        assert!(matches!(msg.status(), Err(ProtocolError::MalformedPayload(_))));
        let empty = Message::empty(Opcode::Unlink);
        assert!(empty.status().is_err());
    }

    #[test]
    fn string_list_roundtrip() {
        let encoded = join_strings(&["a", "", "plant.l"]);
        assert_eq!(encoded, b"a\0\0plant.l\0");
        assert_eq!(split_strings(&encoded).unwrap(), vec!["a", "", "plant.l"]);
    }

    #[test]
    fn empty_list_is_empty_payload() {
        assert!(join_strings(&[]).is_empty());
        assert!(split_strings(&[]).unwrap().is_empty());
        assert_eq!(split_strings(b"\0").unwrap(), vec![String::new()]);
    }

    #[test]
    fn unterminated_list_rejected() {
        assert!(split_strings(b"abc").is_err());
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert!(split_strings(&[0xff, 0xfe, 0]).is_err());
    }

    #[test]
    fn first_string_split() {
        let (path, rest) = split_first_string(b"/oofs/a\0\x01\x02").unwrap();
        assert_eq!(path, "/oofs/a");
        assert_eq!(rest, &[1, 2]);
        assert!(split_first_string(b"no-nul").is_err());
    }

    #[test]
    fn size_field() {
        let encoded = encode_size(0x0102_0304);
        assert_eq!(encoded, [1, 2, 3, 4]);
        let mut data = encoded.to_vec();
        data.extend_from_slice(b"tail");
        let (size, rest) = decode_size(&data).unwrap();
        assert_eq!(size, 0x0102_0304);
        assert_eq!(rest, b"tail");
        assert!(decode_size(&[1, 2]).is_err());
    }

    #[test]
    fn ok_strings_body() {
        let msg = Message::ok_strings(Opcode::GetDir, &["x", "y"]);
        let (ok, body) = msg.status().unwrap();
        assert!(ok);
        assert_eq!(split_strings(body).unwrap(), vec!["x", "y"]);
    }
}
