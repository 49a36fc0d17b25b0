//! Blocking message transport over one persistent stream.
//!
//! [`MessageSocket`] owns the stream and two growable buffers. Writes and
//! reads tolerate partial progress and keep going until the frame is
//! complete or the peer goes away. Every call blocks; there is no timeout
//! beyond what the OS socket imposes.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::FrameCodec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, BLOCK_SIZE};
use crate::opcode::Opcode;

const READ_CHUNK: usize = 8 * 1024;

/// Framed message transport over a `Read + Write` stream.
pub struct MessageSocket<S> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl<S: Read + Write> MessageSocket<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Send one message, blocking until every byte is written.
    pub fn send(&mut self, msg: &Message) -> ProtocolResult<()> {
        self.write_buf.clear();
        FrameCodec::encode(msg, &mut self.write_buf)?;
        let mut written = 0;
        while written < self.write_buf.len() {
            match self.stream.write(&self.write_buf[written..]) {
                Ok(0) => return Err(ProtocolError::PeerClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.stream.flush()?;
        trace!(opcode = %msg.opcode, len = msg.payload.len(), "sent frame");
        Ok(())
    }

    /// Receive the next message, blocking until a whole frame has arrived.
    pub fn recv(&mut self) -> ProtocolResult<Message> {
        loop {
            if let Some(msg) = FrameCodec::decode(&mut self.read_buf)? {
                trace!(opcode = %msg.opcode, len = msg.payload.len(), "received frame");
                return Ok(msg);
            }
            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.read(&mut chunk) {
                Ok(0) if self.read_buf.is_empty() => return Err(ProtocolError::PeerClosed),
                Ok(0) => {
                    return Err(ProtocolError::FramingError(format!(
                        "peer closed mid-frame with {} bytes buffered",
                        self.read_buf.len()
                    )))
                }
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive the next message and require it to carry `expected`.
    pub fn recv_expect(&mut self, expected: Opcode) -> ProtocolResult<Message> {
        let msg = self.recv()?;
        if msg.opcode != expected {
            return Err(ProtocolError::UnexpectedOpcode {
                expected,
                actual: msg.opcode,
            });
        }
        Ok(msg)
    }

    /// Send one request and wait for its response.
    pub fn call(&mut self, request: &Message) -> ProtocolResult<Message> {
        self.send(request)?;
        self.recv_expect(request.opcode)
    }

    /// Stream exactly `size` bytes from `reader` as `ArchiveBlock` messages.
    pub fn send_blocks<R: Read>(&mut self, reader: &mut R, size: u64) -> ProtocolResult<()> {
        let mut remaining = size;
        let mut block = vec![0u8; BLOCK_SIZE];
        while remaining > 0 {
            let want = remaining.min(BLOCK_SIZE as u64) as usize;
            reader.read_exact(&mut block[..want])?;
            self.send(&Message::new(Opcode::ArchiveBlock, block[..want].to_vec()))?;
            remaining -= want as u64;
        }
        Ok(())
    }

    /// Receive `ArchiveBlock` messages until `size` bytes have been written
    /// to `writer`.
    ///
    /// No other request may be issued on this socket until this returns.
    pub fn recv_blocks<W: Write>(&mut self, writer: &mut W, size: u64) -> ProtocolResult<()> {
        let mut remaining = size;
        while remaining > 0 {
            let block = self.recv_expect(Opcode::ArchiveBlock)?;
            let len = block.payload.len() as u64;
            if len == 0 || len > BLOCK_SIZE as u64 || len > remaining {
                return Err(ProtocolError::FramingError(format!(
                    "block of {len} bytes with {remaining} bytes outstanding"
                )));
            }
            writer.write_all(&block.payload)?;
            remaining -= len;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory duplex: reads from `input`, writes to `output`, at most
    /// `step` bytes per call to exercise partial progress.
    struct Pipe {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
        step: usize,
    }

    impl Pipe {
        fn new(input: Vec<u8>, step: usize) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
                step,
            }
        }
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.input.read(&mut buf[..n])
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn wire_of(msgs: &[Message]) -> Vec<u8> {
        let mut sock = MessageSocket::new(Pipe::new(Vec::new(), 5));
        for msg in msgs {
            sock.send(msg).unwrap();
        }
        sock.into_inner().output
    }

    #[test]
    fn partial_writes_and_reads_roundtrip() {
        let sent = vec![
            Message::empty(Opcode::SearchEnd),
            Message::new(Opcode::FetchFile, vec![3u8; BLOCK_SIZE + 100]),
        ];
        let wire = wire_of(&sent);
        let mut reader = MessageSocket::new(Pipe::new(wire, 7));
        assert_eq!(reader.recv().unwrap(), sent[0]);
        assert_eq!(reader.recv().unwrap(), sent[1]);
        assert!(matches!(reader.recv(), Err(ProtocolError::PeerClosed)));
    }

    #[test]
    fn unexpected_opcode_is_protocol_error() {
        let wire = wire_of(&[Message::empty(Opcode::Unlink)]);
        let mut reader = MessageSocket::new(Pipe::new(wire, 64));
        let err = reader.recv_expect(Opcode::DelTree).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedOpcode {
                expected: Opcode::DelTree,
                actual: Opcode::Unlink
            }
        ));
    }

    #[test]
    fn truncated_frame_is_framing_error() {
        let mut wire = wire_of(&[Message::new(Opcode::FetchFile, vec![1u8; 32])]);
        wire.truncate(wire.len() - 4);
        let mut reader = MessageSocket::new(Pipe::new(wire, 64));
        assert!(matches!(reader.recv(), Err(ProtocolError::FramingError(_))));
    }

    #[test]
    fn zero_length_write_is_peer_closed() {
        struct Closed;
        impl Read for Closed {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut sock = MessageSocket::new(Closed);
        assert!(matches!(
            sock.send(&Message::empty(Opcode::Logout)),
            Err(ProtocolError::PeerClosed)
        ));
    }

    #[test]
    fn block_stream_roundtrip() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 2 + 333).map(|i| (i % 97) as u8).collect();
        let mut sender = MessageSocket::new(Pipe::new(Vec::new(), 4096));
        sender
            .send_blocks(&mut Cursor::new(&data), data.len() as u64)
            .unwrap();
        let wire = sender.into_inner().output;

        let mut receiver = MessageSocket::new(Pipe::new(wire, 1000));
        let mut out = Vec::new();
        receiver.recv_blocks(&mut out, data.len() as u64).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn block_stream_sizes_are_bounded() {
        let data = vec![0xAAu8; BLOCK_SIZE * 3];
        let mut sender = MessageSocket::new(Pipe::new(Vec::new(), usize::MAX));
        sender
            .send_blocks(&mut Cursor::new(&data), data.len() as u64)
            .unwrap();
        let wire = sender.into_inner().output;
        let mut reader = MessageSocket::new(Pipe::new(wire, usize::MAX));
        for _ in 0..3 {
            let block = reader.recv_expect(Opcode::ArchiveBlock).unwrap();
            assert_eq!(block.payload.len(), BLOCK_SIZE);
        }
    }

    #[test]
    fn oversized_block_rejected() {
        let wire = wire_of(&[Message::new(Opcode::ArchiveBlock, vec![0u8; 10])]);
        let mut reader = MessageSocket::new(Pipe::new(wire, 64));
        let mut out = Vec::new();
        assert!(matches!(
            reader.recv_blocks(&mut out, 4),
            Err(ProtocolError::FramingError(_))
        ));
    }

    #[test]
    fn empty_stream_sends_nothing() {
        let mut sender = MessageSocket::new(Pipe::new(Vec::new(), 64));
        sender.send_blocks(&mut Cursor::new(Vec::new()), 0).unwrap();
        assert!(sender.into_inner().output.is_empty());
    }
}
