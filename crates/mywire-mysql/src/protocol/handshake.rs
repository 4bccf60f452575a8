//! Connection-phase packets: the server greeting, the client's handshake
//! response and the SSLRequest.
//!
//! # References
//!
//! - [Protocol::HandshakeV10](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_v10.html)
//! - [Protocol::HandshakeResponse41](https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets_protocol_handshake_response.html)

#![allow(clippy::cast_possible_truncation)]

use mywire_core::Error;
use mywire_core::error::{AuthenticationError, AuthenticationErrorKind};

use super::{PacketReader, PacketWriter, capabilities};
use crate::auth::plugins;

/// The server's initial handshake packet (protocol version 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialHandshake {
    /// Protocol version (always 10)
    pub protocol_version: u8,
    /// Server version string
    pub server_version: String,
    /// Connection (thread) id
    pub connection_id: u32,
    /// Auth plugin seed, both parts concatenated, without trailing NUL
    pub auth_data: Vec<u8>,
    /// Server capability flags
    pub capabilities: u32,
    /// Server default charset
    pub charset: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Default authentication plugin
    pub auth_plugin: String,
}

impl InitialHandshake {
    /// Parse the greeting.
    ///
    /// A greeting that is an ERR packet (for example "Host is blocked")
    /// is reported as a rejected authentication attempt.
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut reader = PacketReader::new(payload);

        let protocol_version = reader.read_u8().map_err(malformed)?;
        if protocol_version == 0xFF {
            let err = reader.parse_err_packet().map_err(malformed)?;
            return Err(Error::Authentication(AuthenticationError {
                kind: AuthenticationErrorKind::Rejected,
                code: Some(err.error_code),
                sqlstate: Some(err.sql_state),
                message: err.error_message,
            }));
        }
        if protocol_version != 10 {
            return Err(Error::authentication(
                AuthenticationErrorKind::Malformed,
                format!("unsupported protocol version: {}", protocol_version),
            ));
        }

        let server_version = reader.read_null_string();
        let connection_id = reader.read_u32_le().map_err(malformed)?;

        // Auth plugin data part 1 (8 bytes) and a filler byte
        let mut auth_data = reader.read_bytes(8).map_err(malformed)?.to_vec();
        reader.skip(1).map_err(malformed)?;

        let caps_lower = reader.read_u16_le().map_err(malformed)?;

        // Pre-4.1 servers stop here
        if reader.is_empty() {
            return Ok(Self {
                protocol_version,
                server_version,
                connection_id,
                auth_data,
                capabilities: u32::from(caps_lower),
                charset: 0,
                status_flags: 0,
                auth_plugin: plugins::MYSQL_NATIVE_PASSWORD.to_string(),
            });
        }

        let charset = reader.read_u8().map_err(malformed)?;
        let status_flags = reader.read_u16_le().map_err(malformed)?;
        let caps_upper = reader.read_u16_le().map_err(malformed)?;
        let capabilities = u32::from(caps_lower) | (u32::from(caps_upper) << 16);

        let auth_data_len = usize::from(reader.read_u8().map_err(malformed)?);

        // Reserved (10 bytes)
        reader.skip(10).map_err(malformed)?;

        if capabilities & capabilities::CLIENT_SECURE_CONNECTION != 0 {
            let len2 = auth_data_len.saturating_sub(8).max(13).min(reader.remaining());
            let part2 = reader.read_bytes(len2).map_err(malformed)?;
            auth_data.extend_from_slice(strip_nul(part2));
        }

        let auth_plugin = if capabilities & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            reader.read_null_string()
        } else {
            String::new()
        };
        let auth_plugin = if auth_plugin.is_empty() {
            plugins::MYSQL_NATIVE_PASSWORD.to_string()
        } else {
            auth_plugin
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            auth_data,
            capabilities,
            charset,
            status_flags,
            auth_plugin,
        })
    }

    /// Is the server a MariaDB server?
    pub fn is_mariadb(&self) -> bool {
        self.server_version.contains("MariaDB")
    }

    /// Encode the greeting as a server would send it.
    ///
    /// The seed is split after its first 8 bytes and the second part is
    /// NUL-terminated.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_capacity(96);
        writer.write_u8(self.protocol_version);
        writer.write_null_string(&self.server_version);
        writer.write_u32_le(self.connection_id);

        let split = self.auth_data.len().min(8);
        let (part1, part2) = self.auth_data.split_at(split);
        writer.write_bytes(part1);
        writer.write_zeros(8 - split);
        writer.write_u8(0);

        writer.write_u16_le((self.capabilities & 0xFFFF) as u16);
        writer.write_u8(self.charset);
        writer.write_u16_le(self.status_flags);
        writer.write_u16_le((self.capabilities >> 16) as u16);
        writer.write_u8((self.auth_data.len() + 1).max(21) as u8);
        writer.write_zeros(10);

        let mut seed2 = part2.to_vec();
        seed2.resize(seed2.len().max(12), 0);
        writer.write_bytes(&seed2);
        writer.write_u8(0);
        writer.write_null_string(&self.auth_plugin);
        writer.into_bytes()
    }
}

/// Drop the trailing NUL the server appends to seeds.
pub(crate) fn strip_nul(data: &[u8]) -> &[u8] {
    match data.split_last() {
        Some((0, rest)) => rest,
        _ => data,
    }
}

fn malformed(err: Error) -> Error {
    Error::authentication(
        AuthenticationErrorKind::Malformed,
        format!("malformed server greeting: {}", err),
    )
}

/// The client's HandshakeResponse41.
#[derive(Debug, Clone, Default)]
pub struct HandshakeResponse<'a> {
    /// Negotiated client capabilities
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    /// Scrambled credential for `auth_plugin`
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin: &'a str,
    /// Connect attributes, sent when CLIENT_CONNECT_ATTRS was negotiated
    pub attributes: &'a [(String, String)],
}

impl HandshakeResponse<'_> {
    /// Encode the response payload.
    pub fn encode(&self) -> Vec<u8> {
        let caps = self.capabilities;
        let mut writer = PacketWriter::with_capacity(128);

        writer.write_u32_le(caps);
        writer.write_u32_le(self.max_packet_size);
        writer.write_u8(self.charset);
        writer.write_zeros(23);
        writer.write_null_string(self.username);

        if caps & capabilities::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            writer.write_lenenc_bytes(self.auth_response);
        } else {
            // Scrambles are at most 32 bytes, RSA payloads are sent later
            writer.write_u8(self.auth_response.len() as u8);
            writer.write_bytes(self.auth_response);
        }

        if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
            writer.write_null_string(self.database.unwrap_or(""));
        }

        if caps & capabilities::CLIENT_PLUGIN_AUTH != 0 {
            writer.write_null_string(self.auth_plugin);
        }

        if caps & capabilities::CLIENT_CONNECT_ATTRS != 0 {
            let mut attrs = PacketWriter::new();
            for (key, value) in self.attributes {
                attrs.write_lenenc_string(key);
                attrs.write_lenenc_string(value);
            }
            writer.write_lenenc_bytes(attrs.as_bytes());
        }

        writer.into_bytes()
    }
}

/// Build the SSLRequest payload: the fixed-size prefix of the handshake
/// response, sent before the TLS handshake starts.
pub fn build_ssl_request(capabilities: u32, max_packet_size: u32, charset: u8) -> Vec<u8> {
    let mut writer = PacketWriter::with_capacity(32);
    writer.write_u32_le(capabilities | capabilities::CLIENT_SSL);
    writer.write_u32_le(max_packet_size);
    writer.write_u8(charset);
    writer.write_zeros(23);
    writer.into_bytes()
}
