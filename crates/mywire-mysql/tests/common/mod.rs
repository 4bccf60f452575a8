//! Scripted in-process MySQL server for exercising the client engine.
//!
//! Each test spawns a listener on an ephemeral loopback port and hands a
//! closure the accepted socket. The closure plays the server side of the
//! conversation packet by packet.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mywire_mysql::auth::{mysql_native_password, plugins};
use mywire_mysql::protocol::{
    InitialHandshake, PacketReader, PacketWriter, StmtPrepareOk, capabilities,
    encode_stmt_prepare_ok, frame_payload, server_status,
};
use mywire_mysql::types::{ColumnDef, encode_binary_row, encode_text_row};
use mywire_mysql::{MySqlConfig, Value};

pub const USER: &str = "toy";
pub const PASSWORD: &str = "secret";
pub const SEED: &[u8; 20] = b"abcdefghijklmnopqrst";

pub const SERVER_CAPS: u32 = capabilities::DEFAULT_CLIENT_FLAGS
    | capabilities::CLIENT_CONNECT_WITH_DB
    | capabilities::CLIENT_MULTI_STATEMENTS
    | capabilities::CLIENT_CONNECT_ATTRS;

pub const AUTOCOMMIT: u16 = server_status::SERVER_STATUS_AUTOCOMMIT;

/// Server end of one client connection.
pub struct ServerSide {
    stream: TcpStream,
    seq: u8,
}

/// Fields of the client's handshake response the tests look at.
#[derive(Debug)]
pub struct ClientHello {
    pub capabilities: u32,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub plugin: String,
}

impl ServerSide {
    /// Send one packet with the current sequence id.
    pub fn send(&mut self, payload: &[u8]) {
        let (framed, next) = frame_payload(payload, self.seq);
        self.stream.write_all(&framed).unwrap();
        self.stream.flush().unwrap();
        self.seq = next;
    }

    /// Send one packet with an arbitrary sequence id.
    pub fn send_with_seq(&mut self, payload: &[u8], seq: u8) {
        let (framed, _) = frame_payload(payload, seq);
        self.stream.write_all(&framed).unwrap();
        self.stream.flush().unwrap();
    }

    /// Read one packet and check its sequence id.
    pub fn recv(&mut self) -> Vec<u8> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).unwrap();
        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        assert_eq!(header[3], self.seq, "client packet sequence");
        self.seq = self.seq.wrapping_add(1);
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).unwrap();
        payload
    }

    /// Read the first packet of a new command.
    pub fn recv_command(&mut self) -> Vec<u8> {
        self.seq = 0;
        self.recv()
    }

    /// Wait for the client to hang up, tolerating a final COM_QUIT.
    pub fn expect_quit(&mut self) {
        let mut header = [0u8; 4];
        if self.stream.read_exact(&mut header).is_ok() {
            let mut command = [0u8; 1];
            self.stream.read_exact(&mut command).unwrap();
            assert_eq!(command[0], 0x01, "expected COM_QUIT");
        }
    }

    /// Send the greeting and read the handshake response.
    pub fn greet(&mut self, plugin: &str) -> ClientHello {
        self.greet_with(plugin, SERVER_CAPS)
    }

    /// Greet offering `capabilities` instead of the default set.
    pub fn greet_with(&mut self, plugin: &str, capabilities: u32) -> ClientHello {
        let greeting = InitialHandshake {
            protocol_version: 10,
            server_version: "10.11.6-MariaDB-fixture".to_string(),
            connection_id: 7,
            auth_data: SEED.to_vec(),
            capabilities,
            charset: 45,
            status_flags: AUTOCOMMIT,
            auth_plugin: plugin.to_string(),
        };
        self.seq = 0;
        self.send(&greeting.encode());
        parse_hello(&self.recv())
    }

    /// Greet, check the native password scramble, and accept.
    pub fn accept(&mut self) -> ClientHello {
        self.accept_with(SERVER_CAPS)
    }

    pub fn accept_with(&mut self, capabilities: u32) -> ClientHello {
        let hello = self.greet_with(plugins::MYSQL_NATIVE_PASSWORD, capabilities);
        assert_eq!(hello.username, USER);
        assert_eq!(hello.auth_response, mysql_native_password(PASSWORD, SEED));
        self.ok(0, 0, AUTOCOMMIT);
        hello
    }

    pub fn ok(&mut self, affected_rows: u64, last_insert_id: u64, status: u16) {
        self.send(&ok_payload(0x00, affected_rows, last_insert_id, status));
    }

    pub fn err(&mut self, code: u16, sqlstate: &str, message: &str) {
        let mut w = PacketWriter::new();
        w.write_u8(0xFF);
        w.write_u16_le(code);
        w.write_u8(b'#');
        w.write_bytes(sqlstate.as_bytes());
        w.write_bytes(message.as_bytes());
        self.send(&w.into_bytes());
    }

    /// Legacy EOF packet: 0xFE, warnings, status flags.
    pub fn eof(&mut self, status: u16) {
        let mut w = PacketWriter::new();
        w.write_u8(0xFE);
        w.write_u16_le(0);
        w.write_u16_le(status);
        self.send(&w.into_bytes());
    }

    /// A text result set framed the pre-DEPRECATE_EOF way: EOF after the
    /// column definitions and EOF after the rows.
    pub fn legacy_text_result(
        &mut self,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
        column_status: u16,
        end_status: u16,
    ) {
        self.columns(columns);
        self.eof(column_status);
        for row in rows {
            self.send(&encode_text_row(row, columns).unwrap());
        }
        self.eof(end_status);
    }

    /// Answer COM_STMT_PREPARE with an EOF closing each definition block.
    pub fn legacy_prepare_ok(
        &mut self,
        statement_id: u32,
        params: &[ColumnDef],
        columns: &[ColumnDef],
    ) {
        let ok = StmtPrepareOk {
            statement_id,
            num_columns: columns.len() as u16,
            num_params: params.len() as u16,
            warnings: 0,
        };
        self.send(&encode_stmt_prepare_ok(&ok));
        for block in [params, columns] {
            if block.is_empty() {
                continue;
            }
            for column in block {
                self.send(&column.encode());
            }
            self.eof(AUTOCOMMIT);
        }
    }

    /// Column count and definitions, without a trailing EOF.
    pub fn columns(&mut self, columns: &[ColumnDef]) {
        let mut w = PacketWriter::new();
        w.write_lenenc_int(columns.len() as u64);
        self.send(&w.into_bytes());
        for column in columns {
            self.send(&column.encode());
        }
    }

    /// A complete text result set terminated by an OK packet.
    pub fn text_result(&mut self, columns: &[ColumnDef], rows: &[Vec<Value>], status: u16) {
        self.columns(columns);
        for row in rows {
            self.send(&encode_text_row(row, columns).unwrap());
        }
        self.send(&ok_payload(0xFE, 0, 0, status));
    }

    pub fn binary_result(&mut self, columns: &[ColumnDef], rows: &[Vec<Value>], status: u16) {
        self.columns(columns);
        for row in rows {
            self.send(&encode_binary_row(row, columns).unwrap());
        }
        self.send(&ok_payload(0xFE, 0, 0, status));
    }

    /// Answer COM_STMT_PREPARE.
    pub fn prepare_ok(&mut self, statement_id: u32, params: &[ColumnDef], columns: &[ColumnDef]) {
        let ok = StmtPrepareOk {
            statement_id,
            num_columns: columns.len() as u16,
            num_params: params.len() as u16,
            warnings: 0,
        };
        self.send(&encode_stmt_prepare_ok(&ok));
        for column in params.iter().chain(columns) {
            self.send(&column.encode());
        }
    }

    pub fn shutdown(self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

pub fn ok_payload(header: u8, affected_rows: u64, last_insert_id: u64, status: u16) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.write_u8(header);
    w.write_lenenc_int(affected_rows);
    w.write_lenenc_int(last_insert_id);
    w.write_u16_le(status);
    w.write_u16_le(0);
    w.into_bytes()
}

fn parse_hello(payload: &[u8]) -> ClientHello {
    let mut r = PacketReader::new(payload);
    let caps = r.read_u32_le().unwrap();
    r.read_u32_le().unwrap();
    r.read_u8().unwrap();
    r.skip(23).unwrap();
    let username = r.read_null_string();
    let auth_response = r.read_lenenc_bytes().unwrap().to_vec();
    let database = if caps & capabilities::CLIENT_CONNECT_WITH_DB != 0 {
        Some(r.read_null_string()).filter(|db| !db.is_empty())
    } else {
        None
    };
    let plugin = r.read_null_string();
    ClientHello {
        capabilities: caps,
        username,
        auth_response,
        database,
        plugin,
    }
}

/// A running fixture server.
pub struct Fixture {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Fixture {
    /// Serve one connection with `script`.
    pub fn spawn<F>(script: F) -> Self
    where
        F: FnOnce(ServerSide) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();
            script(ServerSide { stream, seq: 0 });
        });
        Self { addr, handle }
    }

    pub fn config(&self) -> MySqlConfig {
        MySqlConfig::new()
            .host("127.0.0.1")
            .port(self.addr.port())
            .user(USER)
            .password(PASSWORD)
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(5))
    }

    /// Wait for the script to finish, surfacing its assertion failures.
    pub fn join(self) {
        if let Err(panic) = self.handle.join() {
            std::panic::resume_unwind(panic);
        }
    }
}
