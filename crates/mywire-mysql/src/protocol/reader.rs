//! MySQL packet reading utilities.
//!
//! Every read is bounds-checked; running off the end of a payload yields a
//! protocol violation that records the byte offset where the read started.

#![allow(clippy::cast_possible_truncation)]

use crate::protocol::{EofPacket, ErrPacket, OkPacket};
use mywire_core::{Error, Result};

/// A cursor over one logical message payload.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Create a new reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte offset into the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if we've reached the end of the data.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Peek at the next byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn truncated(&self, what: &str, need: usize) -> Error {
        Error::protocol(
            format!(
                "packet truncated reading {}: need {} bytes, {} remaining",
                what,
                need,
                self.remaining()
            ),
            Some(self.pos),
        )
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or_else(|| self.truncated(what, N))?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.take::<1>("u8").map(|b| b[0])
    }

    /// Read a u16 (little-endian).
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.take::<2>("u16").map(u16::from_le_bytes)
    }

    /// Read a u24 (little-endian, 3 bytes).
    pub fn read_u24_le(&mut self) -> Result<u32> {
        self.take::<3>("u24")
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.take::<4>("u32").map(u32::from_le_bytes)
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.take::<8>("u64").map(u64::from_le_bytes)
    }

    /// Read a length-encoded integer that may be the 0xFB NULL marker.
    ///
    /// - 0x00-0xFA: 1-byte value
    /// - 0xFB: NULL (returns `None`)
    /// - 0xFC: 2-byte value follows
    /// - 0xFD: 3-byte value follows
    /// - 0xFE: 8-byte value follows
    /// - 0xFF: never valid here
    pub fn read_lenenc_int_or_null(&mut self) -> Result<Option<u64>> {
        let start = self.pos;
        let first = self.read_u8()?;
        match first {
            0x00..=0xFA => Ok(Some(u64::from(first))),
            0xFB => Ok(None),
            0xFC => self.read_u16_le().map(|v| Some(u64::from(v))),
            0xFD => self.read_u24_le().map(|v| Some(u64::from(v))),
            0xFE => self.read_u64_le().map(Some),
            0xFF => Err(Error::protocol(
                "invalid length-encoded integer prefix 0xFF",
                Some(start),
            )),
        }
    }

    /// Read a length-encoded integer where NULL is not allowed.
    pub fn read_lenenc_int(&mut self) -> Result<u64> {
        let start = self.pos;
        self.read_lenenc_int_or_null()?.ok_or_else(|| {
            Error::protocol("unexpected NULL marker in length-encoded integer", Some(start))
        })
    }

    /// Read a length-encoded byte slice.
    pub fn read_lenenc_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.read_lenenc_int()?;
        let len = usize::try_from(len).map_err(|_| {
            Error::protocol(format!("length {} does not fit in memory", len), Some(start))
        })?;
        self.read_bytes(len)
    }

    /// Read a length-encoded string, replacing invalid UTF-8.
    pub fn read_lenenc_string(&mut self) -> Result<String> {
        self.read_lenenc_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read a null-terminated string.
    ///
    /// A missing terminator consumes the rest of the payload; some servers
    /// omit the NUL after the last field of the handshake.
    pub fn read_null_string(&mut self) -> String {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end;
        if self.pos < self.data.len() {
            self.pos += 1;
        }
        s
    }

    /// Read a fixed-length string.
    pub fn read_string(&mut self, len: usize) -> Result<String> {
        self.read_bytes(len)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Read remaining data as a string.
    pub fn read_rest_string(&mut self) -> String {
        String::from_utf8_lossy(self.read_rest()).into_owned()
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.truncated("byte string", len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read remaining bytes.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        rest
    }

    /// Skip a number of bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(self.truncated("skipped bytes", n));
        }
        self.pos += n;
        Ok(())
    }

    /// Parse an OK packet from the current position.
    ///
    /// OK packet format (protocol 4.1+):
    /// - 0x00 header, or 0xFE when it replaces EOF
    /// - affected_rows: lenenc int
    /// - last_insert_id: lenenc int
    /// - status_flags: 2 bytes
    /// - warnings: 2 bytes
    /// - info: rest of packet (optional)
    pub fn parse_ok_packet(&mut self) -> Result<OkPacket> {
        if matches!(self.peek(), Some(0x00 | 0xFE)) {
            self.skip(1)?;
        }

        let affected_rows = self.read_lenenc_int()?;
        let last_insert_id = self.read_lenenc_int()?;
        let status_flags = self.read_u16_le()?;
        let warnings = self.read_u16_le()?;
        let info = self.read_rest_string();

        Ok(OkPacket {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }

    /// Parse an Error packet from the current position.
    ///
    /// ERR packet format (protocol 4.1+):
    /// - 0xFF header
    /// - error_code: 2 bytes
    /// - '#' marker and 5-byte sql_state (absent in some early errors)
    /// - error_message: rest of packet
    pub fn parse_err_packet(&mut self) -> Result<ErrPacket> {
        if self.peek() == Some(0xFF) {
            self.skip(1)?;
        }

        let error_code = self.read_u16_le()?;

        let sql_state = if self.peek() == Some(b'#') {
            self.skip(1)?;
            self.read_string(5)?
        } else {
            "HY000".to_string()
        };

        let error_message = self.read_rest_string();

        Ok(ErrPacket {
            error_code,
            sql_state,
            error_message,
        })
    }

    /// Parse a legacy EOF packet from the current position.
    pub fn parse_eof_packet(&mut self) -> Result<EofPacket> {
        if self.peek() == Some(0xFE) {
            self.skip(1)?;
        }
        if self.remaining() < 4 {
            // Pre-4.1 EOF carries no status
            return Ok(EofPacket {
                warnings: 0,
                status_flags: 0,
            });
        }

        let warnings = self.read_u16_le()?;
        let status_flags = self.read_u16_le()?;

        Ok(EofPacket {
            warnings,
            status_flags,
        })
    }
}
