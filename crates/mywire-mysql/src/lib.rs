//! Blocking MariaDB/MySQL wire protocol client engine.
//!
//! This crate implements the client side of the MySQL protocol over a
//! blocking socket. It provides:
//!
//! - Packet framing with sequence numbers and large-payload splitting
//! - Authentication (mysql_native_password, caching_sha2_password,
//!   sha256_password) including auth switches and RSA key exchange
//! - Optional TLS upgrade (feature `tls`)
//! - Text and binary result decoding, streamed one row at a time
//! - Prepared statements with a per-connection registry
//! - A connection state machine that rejects interleaved commands
//!
//! # MySQL Protocol Overview
//!
//! MySQL uses a packet-based protocol with:
//! - 3-byte payload length + 1-byte sequence number header
//! - Packets over 16MB are split
//! - Request/response pairing via sequence numbers
//!
//! # Example
//!
//! ```rust,ignore
//! use mywire_mysql::{MySqlConfig, MySqlConnection, Value};
//!
//! let config = MySqlConfig::new()
//!     .host("localhost")
//!     .port(3306)
//!     .user("root")
//!     .database("toys");
//!
//! let mut conn = MySqlConnection::connect(config)?;
//! let stmt = conn.prepare("SELECT name FROM toys WHERE id = ?")?;
//! for row in conn.execute_prepared(&stmt, &[Value::Int(42)])? {
//!     let name: String = row?.get_named("name")?;
//!     println!("{name}");
//! }
//! conn.close_statement(&stmt)?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod result;
pub mod tls;
pub mod transport;
pub mod types;

pub use config::{MySqlConfig, SslMode, TlsConfig};
pub use connection::{ConnectionState, MySqlConnection};
pub use protocol::PreparedStatement;
pub use result::{QueryOutcome, ResultSet};
pub use types::{ColumnDef, FieldType};

pub use mywire_core::{Date, DateTime, Error, FromValue, Result, Row, Time, Value};
