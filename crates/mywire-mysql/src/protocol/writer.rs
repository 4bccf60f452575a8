//! MySQL packet writing utilities.
//!
//! `PacketWriter` builds one logical message payload; `frame_payload`
//! wraps a payload in one or more packet headers.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader};

/// A writer for MySQL protocol data.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the payload written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a u16 (little-endian).
    pub fn write_u16_le(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u24 (little-endian, 3 bytes).
    pub fn write_u24_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Write a u32 (little-endian).
    pub fn write_u32_le(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a u64 (little-endian).
    pub fn write_u64_le(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-encoded integer.
    ///
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFC + 2 bytes: values below 2^16
    /// - 0xFD + 3 bytes: values below 2^24
    /// - 0xFE + 8 bytes: everything else
    pub fn write_lenenc_int(&mut self, value: u64) {
        if value < 251 {
            self.write_u8(value as u8);
        } else if value < 0x1_0000 {
            self.write_u8(0xFC);
            self.write_u16_le(value as u16);
        } else if value < 0x0100_0000 {
            self.write_u8(0xFD);
            self.write_u24_le(value as u32);
        } else {
            self.write_u8(0xFE);
            self.write_u64_le(value);
        }
    }

    /// Write the 0xFB marker that stands for NULL in text rows.
    pub fn write_lenenc_null(&mut self) {
        self.write_u8(0xFB);
    }

    /// Write a length-encoded string.
    pub fn write_lenenc_string(&mut self, s: &str) {
        self.write_lenenc_bytes(s.as_bytes());
    }

    /// Write a length-encoded byte slice.
    pub fn write_lenenc_bytes(&mut self, data: &[u8]) {
        self.write_lenenc_int(data.len() as u64);
        self.buffer.extend_from_slice(data);
    }

    /// Write a null-terminated string.
    pub fn write_null_string(&mut self, s: &str) {
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(0);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write zeros (padding).
    pub fn write_zeros(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0);
    }

    /// Frame the payload written so far, starting at `sequence_id`.
    pub fn build_packet(&self, sequence_id: u8) -> Vec<u8> {
        frame_payload(&self.buffer, sequence_id).0
    }
}

/// Frame a logical message into packets.
///
/// Payloads longer than `MAX_PACKET_SIZE` are split into consecutive packets
/// with increasing sequence ids. Every full-size packet is followed by
/// another one, so a payload that is an exact multiple of the maximum ends
/// with an empty packet. Returns the framed bytes and the next sequence id.
pub fn frame_payload(payload: &[u8], mut sequence_id: u8) -> (Vec<u8>, u8) {
    let packets = payload.len() / MAX_PACKET_SIZE + 1;
    let mut out = Vec::with_capacity(payload.len() + packets * PacketHeader::SIZE);
    let mut chunks = payload.chunks(MAX_PACKET_SIZE);
    loop {
        let chunk = chunks.next().unwrap_or(&[]);
        let header = PacketHeader {
            payload_length: chunk.len() as u32,
            sequence_id,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        if chunk.len() < MAX_PACKET_SIZE {
            break;
        }
    }
    (out, sequence_id)
}

/// Build a command payload: the command byte followed by its arguments.
pub fn build_command_packet(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + payload.len());
    writer.write_u8(command);
    writer.write_bytes(payload);
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split framed bytes back into (length, sequence) headers.
    fn headers(framed: &[u8]) -> Vec<(usize, u8)> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < framed.len() {
            let header = PacketHeader::from_bytes(&[
                framed[pos],
                framed[pos + 1],
                framed[pos + 2],
                framed[pos + 3],
            ]);
            out.push((header.payload_length as usize, header.sequence_id));
            pos += PacketHeader::SIZE + header.payload_length as usize;
        }
        out
    }

    #[test]
    fn test_write_fixed_width_integers() {
        let mut writer = PacketWriter::new();
        writer.write_u8(0x42);
        writer.write_u16_le(0x1234);
        writer.write_u24_le(0x0012_3456);
        writer.write_u32_le(0x1234_5678);
        writer.write_u64_le(0x0807_0605_0403_0201);
        assert_eq!(
            writer.as_bytes(),
            &[
                0x42, 0x34, 0x12, 0x56, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 1, 2, 3, 4, 5, 6, 7, 8
            ]
        );
    }

    #[test]
    fn test_write_lenenc_int_boundaries() {
        let cases: [(u64, &[u8]); 6] = [
            (250, &[0xFA]),
            (251, &[0xFC, 0xFB, 0x00]),
            (0xFFFF, &[0xFC, 0xFF, 0xFF]),
            (0x1_0000, &[0xFD, 0x00, 0x00, 0x01]),
            (0xFF_FFFF, &[0xFD, 0xFF, 0xFF, 0xFF]),
            (0x0100_0000, &[0xFE, 0, 0, 0, 1, 0, 0, 0, 0]),
        ];
        for (value, expected) in cases {
            let mut writer = PacketWriter::new();
            writer.write_lenenc_int(value);
            assert_eq!(writer.as_bytes(), expected, "value {value}");
        }
    }

    #[test]
    fn test_write_strings() {
        let mut writer = PacketWriter::new();
        writer.write_lenenc_string("toy");
        writer.write_null_string("root");
        writer.write_lenenc_null();
        assert_eq!(writer.as_bytes(), b"\x03toyroot\0\xFB");
    }

    #[test]
    fn test_build_packet() {
        let mut writer = PacketWriter::new();
        writer.write_bytes(b"hello");
        let packet = writer.build_packet(1);
        assert_eq!(&packet[..4], &[0x05, 0x00, 0x00, 0x01]);
        assert_eq!(&packet[4..], b"hello");
    }

    #[test]
    fn test_frame_empty_payload() {
        let (framed, next) = frame_payload(&[], 0);
        assert_eq!(framed, vec![0, 0, 0, 0]);
        assert_eq!(next, 1);
    }

    #[test]
    fn test_frame_exact_multiple_gets_trailing_empty_packet() {
        let payload = vec![0xAB; MAX_PACKET_SIZE];
        let (framed, next) = frame_payload(&payload, 3);
        assert_eq!(headers(&framed), vec![(MAX_PACKET_SIZE, 3), (0, 4)]);
        assert_eq!(next, 5);

        let payload = vec![0xCD; 2 * MAX_PACKET_SIZE];
        let (framed, _) = frame_payload(&payload, 0);
        assert_eq!(
            headers(&framed),
            vec![(MAX_PACKET_SIZE, 0), (MAX_PACKET_SIZE, 1), (0, 2)]
        );
    }

    #[test]
    fn test_frame_remainder_in_last_packet() {
        let payload = vec![0x11; MAX_PACKET_SIZE + 10];
        let (framed, _) = frame_payload(&payload, 255);
        // Sequence ids wrap
        assert_eq!(headers(&framed), vec![(MAX_PACKET_SIZE, 255), (10, 0)]);
        assert_eq!(framed.len(), payload.len() + 2 * PacketHeader::SIZE);
    }

    #[test]
    fn test_build_command_packet() {
        let payload = build_command_packet(0x03, b"SELECT 1");
        assert_eq!(payload[0], 0x03);
        assert_eq!(&payload[1..], b"SELECT 1");
    }
}
