//! MySQL prepared statement (binary protocol) packets.
//!
//! This module builds the payloads for COM_STMT_PREPARE, COM_STMT_EXECUTE,
//! COM_STMT_RESET and COM_STMT_CLOSE, and parses COM_STMT_PREPARE_OK.
//!
//! # Protocol Flow
//!
//! 1. **Prepare**: Client sends COM_STMT_PREPARE with SQL
//!    - Server returns statement ID, param count, column count
//!    - Server sends param column definitions (if any)
//!    - Server sends result column definitions (if any)
//!
//! 2. **Execute**: Client sends COM_STMT_EXECUTE with statement ID + binary params
//!    - Server returns result set (binary protocol) or OK packet
//!
//! 3. **Close**: Client sends COM_STMT_CLOSE with statement ID
//!    - No server response
//!
//! # References
//!
//! - [COM_STMT_PREPARE](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_prepare.html)
//! - [COM_STMT_EXECUTE](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_com_stmt_execute.html)
//! - [Binary Protocol Result Set](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_binary_resultset.html)

use mywire_core::{Error, Result, Value};

use super::{Command, PacketReader, PacketWriter};
use crate::types::{ColumnDef, encode_param, param_type};

/// Response from COM_STMT_PREPARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtPrepareOk {
    /// Unique statement identifier (used in execute/close)
    pub statement_id: u32,
    /// Number of columns in result set (0 for non-SELECT)
    pub num_columns: u16,
    /// Number of parameters (placeholders) in the SQL
    pub num_params: u16,
    /// Number of warnings generated during prepare
    pub warnings: u16,
}

/// A server-side prepared statement handle.
///
/// The handle is only valid on the connection that prepared it, and only
/// until it is closed or the connection is reset or closed.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    statement_id: u32,
    sql: String,
    params: Vec<ColumnDef>,
    columns: Vec<ColumnDef>,
    /// Token of the owning connection
    owner: u64,
}

impl PreparedStatement {
    pub(crate) fn new(
        statement_id: u32,
        sql: String,
        params: Vec<ColumnDef>,
        columns: Vec<ColumnDef>,
        owner: u64,
    ) -> Self {
        Self {
            statement_id,
            sql,
            params,
            columns,
            owner,
        }
    }

    /// Server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.statement_id
    }

    /// The SQL text that was prepared.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter descriptors reported by the server.
    pub fn params(&self) -> &[ColumnDef] {
        &self.params
    }

    /// Result column descriptors reported by the server.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Get the number of parameters expected.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Get the number of result columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }
}

/// Build a COM_STMT_PREPARE payload.
pub fn build_stmt_prepare_packet(sql: &str) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(1 + sql.len());
    writer.write_u8(Command::StmtPrepare as u8);
    writer.write_bytes(sql.as_bytes());
    writer.into_bytes()
}

/// Build a COM_STMT_EXECUTE payload.
///
/// # Binary Protocol Parameter Encoding
///
/// The execute packet format is:
/// - Command byte (0x17)
/// - Statement ID (4 bytes, little-endian)
/// - Flags (1 byte): 0x00 = no cursor
/// - Iteration count (4 bytes, always 1)
/// - NULL bitmap, `(num_params + 7) / 8` bytes (if num_params > 0)
/// - New params bound flag (1 byte, always 1)
/// - Type byte and unsigned flag (0x80) per parameter
/// - Values of the non-NULL parameters
pub fn build_stmt_execute_packet(statement_id: u32, params: &[Value]) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(16 + params.len() * 16);

    writer.write_u8(Command::StmtExecute as u8);
    writer.write_u32_le(statement_id);
    // CURSOR_TYPE_NO_CURSOR
    writer.write_u8(0x00);
    writer.write_u32_le(1);

    if params.is_empty() {
        return writer.into_bytes();
    }

    let mut null_bitmap = vec![0u8; params.len().div_ceil(8)];
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            null_bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    writer.write_bytes(&null_bitmap);

    writer.write_u8(1);
    for param in params {
        let (field_type, unsigned) = param_type(param);
        writer.write_u8(field_type as u8);
        writer.write_u8(if unsigned { 0x80 } else { 0x00 });
    }

    for param in params {
        encode_param(param, &mut writer);
    }

    writer.into_bytes()
}

/// Build a COM_STMT_CLOSE payload. The server does not respond.
pub fn build_stmt_close_packet(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(5);
    writer.write_u8(Command::StmtClose as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Build a COM_STMT_RESET payload.
pub fn build_stmt_reset_packet(statement_id: u32) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(5);
    writer.write_u8(Command::StmtReset as u8);
    writer.write_u32_le(statement_id);
    writer.into_bytes()
}

/// Parse a COM_STMT_PREPARE_OK response.
///
/// # Format
///
/// - Status: 0x00 (1 byte)
/// - Statement ID (4 bytes)
/// - Number of columns (2 bytes)
/// - Number of parameters (2 bytes)
/// - Reserved: 0x00 (1 byte)
/// - Warning count (2 bytes, may be absent)
pub fn parse_stmt_prepare_ok(data: &[u8]) -> Result<StmtPrepareOk> {
    let mut reader = PacketReader::new(data);
    let status = reader.read_u8()?;
    if status != 0x00 {
        return Err(Error::protocol(
            format!("COM_STMT_PREPARE_OK status 0x{:02X}, expected 0x00", status),
            Some(0),
        ));
    }
    let statement_id = reader.read_u32_le()?;
    let num_columns = reader.read_u16_le()?;
    let num_params = reader.read_u16_le()?;
    reader.skip(1)?;
    let warnings = if reader.remaining() >= 2 {
        reader.read_u16_le()?
    } else {
        0
    };

    Ok(StmtPrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Encode a COM_STMT_PREPARE_OK payload (server side).
pub fn encode_stmt_prepare_ok(ok: &StmtPrepareOk) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(12);
    writer.write_u8(0x00);
    writer.write_u32_le(ok.statement_id);
    writer.write_u16_le(ok.num_columns);
    writer.write_u16_le(ok.num_params);
    writer.write_u8(0x00);
    writer.write_u16_le(ok.warnings);
    writer.into_bytes()
}
