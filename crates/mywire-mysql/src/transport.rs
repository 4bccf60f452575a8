//! Packet transport.
//!
//! Frames logical messages into MySQL packets on write and reassembles them on
//! read, checking every sequence id against the connection's counter.

// Packet lengths are bounded by MAX_PACKET_SIZE, which fits in u32
#![allow(clippy::cast_possible_truncation)]

use std::io::{self, Read, Write};

use mywire_core::error::{TransportError, TransportErrorKind};
use mywire_core::{Error, Result};

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader, frame_payload};

/// A framed packet stream over any blocking byte stream.
///
/// Request and response packets share one sequence counter, which restarts
/// at zero with every command.
pub struct PacketStream<S> {
    stream: S,
    sequence_id: u8,
    max_message_size: usize,
}

impl<S: Read + Write> PacketStream<S> {
    /// Wrap a stream with no limit on incoming message size.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sequence_id: 0,
            max_message_size: usize::MAX,
        }
    }

    /// Reject incoming logical messages larger than `limit` bytes.
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// The sequence id the next packet will carry (or is expected to carry).
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    /// Restart the sequence counter for a new command.
    pub fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    /// Continue counting from `sequence_id`.
    ///
    /// Used after a TLS upgrade, where the handshake response follows the
    /// SSLRequest packet without a reset.
    pub fn set_sequence(&mut self, sequence_id: u8) {
        self.sequence_id = sequence_id;
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Frame and flush one logical message.
    ///
    /// Payloads of `MAX_PACKET_SIZE` bytes or more are split across packets
    /// with consecutive sequence ids.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        let (frames, next) = frame_payload(payload, self.sequence_id);
        tracing::trace!(
            len = payload.len(),
            sequence_id = self.sequence_id,
            "write message"
        );
        self.stream
            .write_all(&frames)
            .map_err(|e| io_error("write packet", e))?;
        self.stream
            .flush()
            .map_err(|e| io_error("flush stream", e))?;
        self.sequence_id = next;
        Ok(())
    }

    /// Read one logical message, concatenating continuation packets.
    pub fn read_message(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let mut header_buf = [0u8; PacketHeader::SIZE];
            self.stream
                .read_exact(&mut header_buf)
                .map_err(|e| io_error("read packet header", e))?;
            let header = PacketHeader::from_bytes(&header_buf);

            if header.sequence_id != self.sequence_id {
                return Err(Error::Transport(TransportError {
                    kind: TransportErrorKind::SequenceMismatch,
                    message: format!(
                        "packet sequence mismatch: expected {}, got {}",
                        self.sequence_id, header.sequence_id
                    ),
                    source: None,
                }));
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let len = header.payload_length as usize;
            tracing::trace!(len, sequence_id = header.sequence_id, "read packet");
            if payload.len().saturating_add(len) > self.max_message_size {
                return Err(Error::transport(
                    TransportErrorKind::Framing,
                    format!(
                        "incoming message exceeds the {} byte limit",
                        self.max_message_size
                    ),
                ));
            }

            let start = payload.len();
            payload.resize(start + len, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .map_err(|e| io_error("read packet payload", e))?;

            if len < MAX_PACKET_SIZE {
                return Ok(payload);
            }
        }
    }
}

impl<S> std::fmt::Debug for PacketStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketStream")
            .field("sequence_id", &self.sequence_id)
            .finish_non_exhaustive()
    }
}

fn io_error(context: &str, err: io::Error) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        _ => TransportErrorKind::Io,
    };
    Error::Transport(TransportError {
        kind,
        message: format!("failed to {}: {}", context, err),
        source: Some(Box::new(err)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reads from a fixed buffer and records everything written.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn kind_of(err: Error) -> TransportErrorKind {
        match err {
            Error::Transport(t) => t.kind,
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_message_advances_sequence() {
        let mut stream = PacketStream::new(Duplex::new(Vec::new()));
        stream.write_message(&[0x0e]).unwrap();
        stream.write_message(b"ab").unwrap();
        assert_eq!(stream.sequence_id(), 2);
        assert_eq!(
            stream.get_ref().output,
            vec![1, 0, 0, 0, 0x0e, 2, 0, 0, 1, b'a', b'b']
        );
    }

    #[test]
    fn test_read_single_packet() {
        let input = vec![3, 0, 0, 0, b'a', b'b', b'c', 0, 0, 0, 1];
        let mut stream = PacketStream::new(Duplex::new(input));
        assert_eq!(stream.read_message().unwrap(), b"abc");
        assert_eq!(stream.read_message().unwrap(), b"");
        assert_eq!(stream.sequence_id(), 2);
    }

    #[test]
    fn test_sequence_mismatch() {
        let input = vec![1, 0, 0, 5, 0x00];
        let mut stream = PacketStream::new(Duplex::new(input));
        let err = stream.read_message().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected 0, got 5"), "{msg}");
        assert_eq!(kind_of(err), TransportErrorKind::SequenceMismatch);
    }

    #[test]
    fn test_sequence_continues_across_write_and_read() {
        // Request uses id 0, response must be 1
        let input = vec![1, 0, 0, 1, 0x00];
        let mut stream = PacketStream::new(Duplex::new(input));
        stream.write_message(&[0x0e]).unwrap();
        assert_eq!(stream.read_message().unwrap(), vec![0x00]);

        let input = vec![1, 0, 0, 0, 0x00];
        let mut stream = PacketStream::new(Duplex::new(input));
        stream.write_message(&[0x0e]).unwrap();
        assert_eq!(
            kind_of(stream.read_message().unwrap_err()),
            TransportErrorKind::SequenceMismatch
        );
    }

    #[test]
    fn test_sequence_wraps() {
        let input = vec![1, 0, 0, 255, 7, 1, 0, 0, 0, 8];
        let mut stream = PacketStream::new(Duplex::new(input));
        stream.set_sequence(255);
        assert_eq!(stream.read_message().unwrap(), vec![7]);
        assert_eq!(stream.read_message().unwrap(), vec![8]);
    }

    #[test]
    fn test_truncated_payload_is_io_error() {
        let input = vec![5, 0, 0, 0, b'a', b'b'];
        let mut stream = PacketStream::new(Duplex::new(input));
        assert_eq!(
            kind_of(stream.read_message().unwrap_err()),
            TransportErrorKind::Io
        );

        let mut stream = PacketStream::new(Duplex::new(vec![5, 0]));
        assert_eq!(
            kind_of(stream.read_message().unwrap_err()),
            TransportErrorKind::Io
        );
    }

    #[test]
    fn test_message_size_limit() {
        let input = vec![4, 0, 0, 0, 1, 2, 3, 4];
        let mut stream = PacketStream::new(Duplex::new(input)).with_max_message_size(3);
        assert_eq!(
            kind_of(stream.read_message().unwrap_err()),
            TransportErrorKind::Framing
        );
    }

    #[test]
    fn test_exact_multiple_reassembles() {
        let payload = vec![0xAB; MAX_PACKET_SIZE];
        let (frames, next) = frame_payload(&payload, 0);
        assert_eq!(next, 2);
        let mut stream = PacketStream::new(Duplex::new(frames));
        let read = stream.read_message().unwrap();
        assert_eq!(read.len(), MAX_PACKET_SIZE);
        assert_eq!(stream.sequence_id(), 2);
    }

    #[test]
    fn test_split_message_roundtrip() {
        let mut payload = vec![0u8; MAX_PACKET_SIZE + 10];
        payload[MAX_PACKET_SIZE..].copy_from_slice(b"0123456789");
        let mut writer = PacketStream::new(Duplex::new(Vec::new()));
        writer.write_message(&payload).unwrap();
        assert_eq!(writer.sequence_id(), 2);

        let written = writer.into_inner().output;
        assert_eq!(written.len(), payload.len() + 2 * PacketHeader::SIZE);
        let mut reader = PacketStream::new(Duplex::new(written));
        assert_eq!(reader.read_message().unwrap(), payload);
    }
}
