//! MySQL connection implementation.
//!
//! A [`MySqlConnection`] owns one socket, the packet sequence counter, the
//! server status flags and the registry of open prepared statements. It runs
//! the handshake once and then one command at a time.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use mywire_core::error::{OutOfSequenceError, TransportErrorKind};
use mywire_core::{Error, Result, Value};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::auth::{AuthExchange, AuthStep};
use crate::config::MySqlConfig;
use crate::protocol::{
    Command, HandshakeResponse, OkPacket, PacketReader, PacketType, PreparedStatement,
    build_command_packet, build_ssl_request, build_stmt_close_packet, build_stmt_execute_packet,
    build_stmt_prepare_packet, build_stmt_reset_packet, capabilities, parse_stmt_prepare_ok,
    server_status,
};
use crate::result::{QueryOutcome, ResultSet};
use crate::tls::{self, TlsStream};
use crate::transport::PacketStream;
use crate::types::{ColumnDef, FieldType, Format, interpolate_params};

/// Connection state in the MySQL protocol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// TCP connection established, awaiting handshake
    Connecting,
    /// Performing authentication handshake
    Authenticating,
    /// Idle and ready for a command
    Ready,
    /// A command's response has not been fully read
    Executing,
    /// Connection has been closed
    Closed,
}

impl ConnectionState {
    pub const fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Executing => "executing",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Where the reader stands inside a pending response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    /// A result head (OK, ERR or column count) is next
    Head,
    /// Rows of the current result set are next
    Rows,
}

/// First part of a result: a bare OK, or the column definitions of a result
/// set whose rows follow.
pub(crate) enum ResultHead {
    Ok(OkPacket),
    Columns(Vec<ColumnDef>),
}

/// A packet read in the row phase.
pub(crate) enum RowPacket {
    Row(Vec<u8>),
    /// Terminal EOF or OK, normalized to an OK packet
    End(OkPacket),
}

enum Socket {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Released,
}

impl Socket {
    fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Socket::Tcp(stream) => Some(stream),
            Socket::Tls(stream) => Some(stream.get_ref()),
            Socket::Released => None,
        }
    }
}

fn released() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket released")
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.read(buf),
            Socket::Tls(stream) => stream.read(buf),
            Socket::Released => Err(released()),
        }
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(stream) => stream.write(buf),
            Socket::Tls(stream) => stream.write(buf),
            Socket::Released => Err(released()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(stream) => stream.flush(),
            Socket::Tls(stream) => stream.flush(),
            Socket::Released => Err(released()),
        }
    }
}

/// MySQL connection.
///
/// Exactly one command may be in flight at a time. Fatal errors (transport,
/// protocol, authentication, or a server error reporting that the session is
/// gone) close the connection; every later command fails with a `Closed`
/// transport error.
pub struct MySqlConnection {
    stream: PacketStream<Socket>,
    state: ConnectionState,
    pending: Pending,
    config: MySqlConfig,
    server_version: String,
    connection_id: u32,
    server_capabilities: u32,
    client_capabilities: u32,
    status_flags: u16,
    secure: bool,
    /// Identifies statements prepared on this connection
    token: u64,
    statements: HashSet<u32>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("state", &self.state)
            .field("connection_id", &self.connection_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("secure", &self.secure)
            .field("open_statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}

impl MySqlConnection {
    /// Establish a new connection to the MySQL server.
    ///
    /// This performs the complete connection handshake:
    /// 1. TCP connection
    /// 2. Receive server greeting
    /// 3. Optional TLS upgrade
    /// 4. Handshake response and authentication, following auth switches
    #[tracing::instrument(level = "debug", skip(config), fields(host = %config.host, port = config.port))]
    pub fn connect(config: MySqlConfig) -> Result<Self> {
        config.validate()?;
        let stream = open_socket(&config)?;
        let mut conn = Self {
            stream: PacketStream::new(Socket::Tcp(stream))
                .with_max_message_size(config.max_packet_size as usize),
            state: ConnectionState::Connecting,
            pending: Pending::Idle,
            config,
            server_version: String::new(),
            connection_id: 0,
            server_capabilities: 0,
            client_capabilities: 0,
            status_flags: 0,
            secure: false,
            token: OsRng.next_u64(),
            statements: HashSet::new(),
        };

        if let Err(e) = conn.handshake() {
            conn.mark_closed();
            return Err(e);
        }
        conn.apply_session_timeouts()?;

        // Servers without CONNECT_WITH_DB never saw the database name
        if conn.client_capabilities & capabilities::CLIENT_CONNECT_WITH_DB == 0 {
            if let Some(database) = conn.config.database.clone() {
                conn.select_db(&database)?;
            }
        }
        Ok(conn)
    }

    fn handshake(&mut self) -> Result<()> {
        let password = self.config.password.clone().unwrap_or_default();
        let mut exchange = AuthExchange::new(password, self.config.max_auth_switches)
            .with_server_public_key(self.config.server_public_key.clone().map(String::into_bytes));

        let greeting = exchange.on_greeting(&self.stream.read_message()?)?;
        tracing::debug!(
            server_version = %greeting.server_version,
            connection_id = greeting.connection_id,
            plugin = %greeting.auth_plugin,
            "server greeting"
        );
        self.server_version.clone_from(&greeting.server_version);
        self.connection_id = greeting.connection_id;
        self.server_capabilities = greeting.capabilities;
        self.status_flags = greeting.status_flags;
        self.state = ConnectionState::Authenticating;

        let mut client_caps = exchange.negotiate(self.config.capability_flags())?;
        if tls::negotiate_ssl(self.config.ssl_mode, greeting.capabilities)? {
            self.upgrade_to_tls(client_caps)?;
            exchange.set_secure(true);
        } else {
            client_caps &= !capabilities::CLIENT_SSL;
        }
        self.client_capabilities = client_caps;

        let auth_response = exchange.initial_response()?;
        let response = HandshakeResponse {
            capabilities: client_caps,
            max_packet_size: self.config.max_packet_size,
            charset: self.config.charset,
            username: &self.config.user,
            auth_response: &auth_response,
            database: self.config.database.as_deref(),
            auth_plugin: exchange.plugin(),
            attributes: &self.config.attributes,
        }
        .encode();
        self.stream.write_message(&response)?;

        let ok = loop {
            let packet = self.stream.read_message()?;
            match exchange.on_packet(&packet)? {
                AuthStep::Respond(bytes) => self.stream.write_message(&bytes)?,
                AuthStep::Wait => {}
                AuthStep::Done(ok) => break ok,
            }
        };

        tracing::debug!(
            plugin = %exchange.plugin(),
            switches = exchange.switches(),
            secure = self.secure,
            "authenticated"
        );
        self.status_flags = ok.status_flags;
        self.state = ConnectionState::Ready;
        Ok(())
    }

    fn upgrade_to_tls(&mut self, client_caps: u32) -> Result<()> {
        let request = build_ssl_request(client_caps, self.config.max_packet_size, self.config.charset);
        self.stream.write_message(&request)?;

        let sequence = self.stream.sequence_id();
        let placeholder = PacketStream::new(Socket::Released);
        let Socket::Tcp(tcp) = std::mem::replace(&mut self.stream, placeholder).into_inner() else {
            return Err(Error::transport(
                TransportErrorKind::Tls,
                "TLS upgrade requires a plain TCP socket",
            ));
        };

        let tls = TlsStream::new(tcp, &self.config.tls_config, &self.config.host, self.config.ssl_mode)?;
        self.stream = PacketStream::new(Socket::Tls(Box::new(tls)))
            .with_max_message_size(self.config.max_packet_size as usize);
        self.stream.set_sequence(sequence);
        self.secure = true;
        tracing::debug!(ssl_mode = ?self.config.ssl_mode, "connection upgraded to TLS");
        Ok(())
    }

    fn apply_session_timeouts(&mut self) -> Result<()> {
        if let Some(tcp) = self.stream.get_ref().tcp() {
            tcp.set_read_timeout(self.config.read_timeout)?;
            tcp.set_write_timeout(self.config.write_timeout)?;
        }
        Ok(())
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Is the connection idle and ready for a command?
    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Server-assigned connection (thread) id.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Server status flags from the most recent OK or EOF packet.
    pub fn status_flags(&self) -> u16 {
        self.status_flags
    }

    pub fn server_capabilities(&self) -> u32 {
        self.server_capabilities
    }

    /// Capabilities negotiated for this session.
    pub fn client_capabilities(&self) -> u32 {
        self.client_capabilities
    }

    /// Is a transaction open, as reported by the server?
    pub fn in_transaction(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0
    }

    pub fn autocommit(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_AUTOCOMMIT != 0
    }

    /// Is the session encrypted with TLS?
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn no_backslash_escapes(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_NO_BACKSLASH_ESCAPES != 0
    }

    fn deprecate_eof(&self) -> bool {
        self.client_capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0
    }

    /// Run a text-protocol query and stream its rows.
    #[tracing::instrument(level = "debug", skip(self), fields(connection_id = self.connection_id))]
    pub fn query(&mut self, sql: &str) -> Result<ResultSet<'_>> {
        let payload = build_command_packet(Command::Query as u8, sql.as_bytes());
        self.send_command(Command::Query, &payload)?;
        self.pending = Pending::Head;
        ResultSet::start(self, Format::Text).map_err(|e| with_sql(e, sql))
    }

    /// Run a text-protocol query with `?` or `$N` placeholders substituted
    /// client-side.
    pub fn query_with(&mut self, sql: &str, params: &[Value]) -> Result<ResultSet<'_>> {
        let sql = interpolate_params(sql, params, self.no_backslash_escapes())?;
        self.query(&sql)
    }

    /// Run a statement and drain its response.
    pub fn execute(&mut self, sql: &str) -> Result<QueryOutcome> {
        let outcome = self.query(sql)?.drain()?;
        tracing::debug!(
            affected_rows = outcome.affected_rows,
            last_insert_id = outcome.last_insert_id,
            "statement executed"
        );
        Ok(outcome)
    }

    /// Prepare a statement on the server.
    #[tracing::instrument(level = "debug", skip(self), fields(connection_id = self.connection_id))]
    pub fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.send_command(Command::StmtPrepare, &build_stmt_prepare_packet(sql))?;

        let first = self.read_packet()?;
        if PacketType::of_response(&first) == PacketType::Error {
            return Err(with_sql(self.server_error(&first), sql));
        }
        let prepared = parse_stmt_prepare_ok(&first);
        let prepared = self.check(prepared)?;

        let params = self.read_column_defs(usize::from(prepared.num_params))?;
        let columns = self.read_column_defs(usize::from(prepared.num_columns))?;
        self.finish_command();

        self.statements.insert(prepared.statement_id);
        tracing::debug!(
            statement_id = prepared.statement_id,
            params = params.len(),
            columns = columns.len(),
            "statement prepared"
        );
        Ok(PreparedStatement::new(
            prepared.statement_id,
            sql.to_string(),
            params,
            columns,
            self.token,
        ))
    }

    /// Execute a prepared statement with bound parameters.
    #[tracing::instrument(level = "debug", skip(self, stmt, params), fields(statement_id = stmt.id()))]
    pub fn execute_prepared(
        &mut self,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Result<ResultSet<'_>> {
        self.ensure_idle(Command::StmtExecute)?;
        self.check_statement(stmt)?;
        if params.len() != stmt.param_count() {
            return Err(Error::usage(format!(
                "statement expects {} parameters, got {}",
                stmt.param_count(),
                params.len()
            )));
        }

        let payload = build_stmt_execute_packet(stmt.id(), params);
        self.send_command(Command::StmtExecute, &payload)?;
        self.pending = Pending::Head;
        ResultSet::start(self, Format::Binary).map_err(|e| with_sql(e, stmt.sql()))
    }

    /// Reset a prepared statement's server-side state (long data, cursor).
    pub fn reset_statement(&mut self, stmt: &PreparedStatement) -> Result<()> {
        self.ensure_idle(Command::StmtReset)?;
        self.check_statement(stmt)?;
        self.simple_command(Command::StmtReset, &build_stmt_reset_packet(stmt.id()))?;
        Ok(())
    }

    /// Release a prepared statement.
    ///
    /// Closing a statement that is already closed, or that was invalidated by
    /// `reset_connection` or a closed connection, does nothing.
    #[tracing::instrument(level = "debug", skip(self, stmt), fields(statement_id = stmt.id()))]
    pub fn close_statement(&mut self, stmt: &PreparedStatement) -> Result<()> {
        if stmt.owner() != self.token {
            return Err(Error::usage(format!(
                "statement {} belongs to another connection",
                stmt.id()
            )));
        }
        if !self.statements.contains(&stmt.id()) {
            return Ok(());
        }
        self.send_command(Command::StmtClose, &build_stmt_close_packet(stmt.id()))?;
        self.statements.remove(&stmt.id());
        // COM_STMT_CLOSE has no response
        self.finish_command();
        Ok(())
    }

    /// Number of statements prepared on this connection and not yet closed.
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    /// Ping the server to check connection.
    pub fn ping(&mut self) -> Result<()> {
        self.simple_command(Command::Ping, &[Command::Ping as u8])?;
        Ok(())
    }

    /// Change the default database.
    pub fn select_db(&mut self, database: &str) -> Result<()> {
        let payload = build_command_packet(Command::InitDb as u8, database.as_bytes());
        self.simple_command(Command::InitDb, &payload)?;
        Ok(())
    }

    /// Reset session state without re-authenticating.
    ///
    /// The server frees every prepared statement, so all handles from this
    /// connection become invalid.
    pub fn reset_connection(&mut self) -> Result<()> {
        self.simple_command(Command::ResetConnection, &[Command::ResetConnection as u8])?;
        self.statements.clear();
        Ok(())
    }

    /// Ask the server to kill another connection.
    pub fn kill(&mut self, connection_id: u32) -> Result<()> {
        self.execute(&format!("KILL {}", connection_id))?;
        Ok(())
    }

    /// Read and discard the rest of an abandoned response.
    pub fn drain_pending(&mut self) -> Result<()> {
        loop {
            match self.pending {
                Pending::Idle => return Ok(()),
                Pending::Head => {
                    self.read_result_head()?;
                }
                Pending::Rows => {
                    while let RowPacket::Row(_) = self.read_row_packet()? {}
                }
            }
        }
    }

    /// Close the connection gracefully. Calling it again does nothing.
    #[tracing::instrument(level = "debug", skip(self), fields(connection_id = self.connection_id))]
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.stream.reset_sequence();
        if let Err(e) = self.stream.write_message(&[Command::Quit as u8]) {
            tracing::warn!(error = %e, "failed to send COM_QUIT");
        }
        self.mark_closed();
        Ok(())
    }

    fn ensure_idle(&self, command: Command) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(Error::transport(
                TransportErrorKind::Closed,
                format!("cannot {}: connection is closed", command.name()),
            )),
            other => Err(Error::OutOfSequence(OutOfSequenceError {
                attempted: command.name(),
                state: other.name(),
            })),
        }
    }

    fn check_statement(&self, stmt: &PreparedStatement) -> Result<()> {
        if stmt.owner() != self.token {
            return Err(Error::usage(format!(
                "statement {} belongs to another connection",
                stmt.id()
            )));
        }
        if !self.statements.contains(&stmt.id()) {
            return Err(Error::usage(format!(
                "statement {} is closed",
                stmt.id()
            )));
        }
        Ok(())
    }

    fn send_command(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        self.ensure_idle(command)?;
        self.stream.reset_sequence();
        self.state = ConnectionState::Executing;
        let written = self.stream.write_message(payload);
        self.check(written)
    }

    /// Send a command answered by a single OK or ERR packet.
    fn simple_command(&mut self, command: Command, payload: &[u8]) -> Result<OkPacket> {
        self.send_command(command, payload)?;
        let packet = self.read_packet()?;
        match PacketType::of_response(&packet) {
            PacketType::Ok => {
                let ok = self.parse_ok(&packet)?;
                self.finish_command();
                Ok(ok)
            }
            PacketType::Error => Err(self.server_error(&packet)),
            _ => Err(self.violation(
                format!(
                    "unexpected 0x{:02X} packet in response to {}",
                    packet.first().copied().unwrap_or(0),
                    command.name()
                ),
                packet,
            )),
        }
    }

    pub(crate) fn has_pending_result(&self) -> bool {
        self.pending == Pending::Head
    }

    /// Read an OK, ERR or column-count packet and what follows it.
    pub(crate) fn read_result_head(&mut self) -> Result<ResultHead> {
        let packet = self.read_packet()?;
        match PacketType::of_response(&packet) {
            PacketType::Ok => {
                let ok = self.parse_ok(&packet)?;
                self.end_of_result(ok.status_flags);
                tracing::debug!(
                    affected_rows = ok.affected_rows,
                    last_insert_id = ok.last_insert_id,
                    "OK result"
                );
                Ok(ResultHead::Ok(ok))
            }
            PacketType::Error => Err(self.server_error(&packet)),
            PacketType::LocalInfile => {
                Err(self.violation("server requested LOCAL INFILE, which is not enabled", packet))
            }
            PacketType::Eof => Err(self.violation("unexpected EOF packet at result start", packet)),
            PacketType::Data => {
                let count = PacketReader::new(&packet).read_lenenc_int();
                let count = self.check(count)?;
                if count == 0 {
                    return Err(self.violation("result set with zero columns", packet));
                }
                let count = usize::try_from(count).map_err(|_| {
                    self.fail(Error::protocol("column count overflows", Some(0)))
                })?;
                let columns = self.read_column_defs(count)?;
                self.pending = Pending::Rows;
                tracing::debug!(columns = columns.len(), "result set");
                Ok(ResultHead::Columns(columns))
            }
        }
    }

    /// Read the next packet of the row phase.
    pub(crate) fn read_row_packet(&mut self) -> Result<RowPacket> {
        let packet = self.read_packet()?;
        match PacketType::of_row(&packet) {
            PacketType::Data => Ok(RowPacket::Row(packet)),
            PacketType::Error => Err(self.server_error(&packet)),
            _ => {
                let end = if self.deprecate_eof() {
                    self.parse_ok(&packet)?
                } else {
                    let eof = PacketReader::new(&packet).parse_eof_packet();
                    let eof = self.check(eof)?;
                    OkPacket {
                        status_flags: eof.status_flags,
                        warnings: eof.warnings,
                        ..OkPacket::default()
                    }
                };
                self.end_of_result(end.status_flags);
                Ok(RowPacket::End(end))
            }
        }
    }

    /// Read `count` column definitions and, without DEPRECATE_EOF, the EOF
    /// that closes them.
    fn read_column_defs(&mut self, count: usize) -> Result<Vec<ColumnDef>> {
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let packet = self.read_packet()?;
            let column = ColumnDef::parse(&packet);
            let mut column = self.check(column)?;
            column.tiny_as_bool = self.config.tiny_as_bool;
            column.read_as_string = self.config.bit_as_text && column.column_type == FieldType::Bit;
            columns.push(column);
        }
        if count > 0 && !self.deprecate_eof() {
            let packet = self.read_packet()?;
            if PacketType::of_response(&packet) != PacketType::Eof {
                return Err(self.violation("expected EOF after column definitions", packet));
            }
            let eof = PacketReader::new(&packet).parse_eof_packet();
            let eof = self.check(eof)?;
            self.status_flags = eof.status_flags;
        }
        Ok(columns)
    }

    fn end_of_result(&mut self, status_flags: u16) {
        self.status_flags = status_flags;
        if status_flags & server_status::SERVER_MORE_RESULTS_EXISTS != 0 {
            self.pending = Pending::Head;
        } else {
            self.finish_command();
        }
    }

    /// The response is fully read; accept the next command.
    fn finish_command(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Ready;
        }
        self.pending = Pending::Idle;
    }

    fn read_packet(&mut self) -> Result<Vec<u8>> {
        if self.state == ConnectionState::Closed {
            return Err(Error::transport(
                TransportErrorKind::Closed,
                "connection is closed",
            ));
        }
        let packet = self.stream.read_message();
        self.check(packet)
    }

    fn parse_ok(&mut self, packet: &[u8]) -> Result<OkPacket> {
        let ok = PacketReader::new(packet).parse_ok_packet();
        self.check(ok)
    }

    /// Convert an ERR packet. The command is over unless the error ends the
    /// session.
    fn server_error(&mut self, packet: &[u8]) -> Error {
        let err = match PacketReader::new(packet).parse_err_packet() {
            Ok(err) => err.into_server_error(),
            Err(e) => return self.fail(e),
        };
        self.finish_command();
        self.fail(Error::Server(err))
    }

    fn violation(&mut self, message: impl Into<String>, packet: Vec<u8>) -> Error {
        self.fail(Error::Protocol(mywire_core::error::ProtocolError {
            message: message.into(),
            offset: Some(0),
            raw_data: Some(packet),
        }))
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    /// Close the connection if `err` is fatal, then hand it back.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.state != ConnectionState::Closed {
            tracing::debug!(error = %err, "fatal error, closing connection");
            self.mark_closed();
        }
        err
    }

    fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.pending = Pending::Idle;
        self.statements.clear();
        self.stream = PacketStream::new(Socket::Released);
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.close();
        }
    }
}

fn open_socket(config: &MySqlConfig) -> Result<TcpStream> {
    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| connect_error(config, e))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(config.connect_timeout))?;
                stream.set_write_timeout(Some(config.connect_timeout))?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => connect_error(config, e),
        None => Error::transport(
            TransportErrorKind::Io,
            format!("{} did not resolve to any address", config.socket_addr()),
        ),
    })
}

fn connect_error(config: &MySqlConfig, err: io::Error) -> Error {
    let mut error = Error::from(err);
    if let Error::Transport(t) = &mut error {
        t.message = format!("failed to connect to {}: {}", config.socket_addr(), t.message);
    }
    error
}

fn with_sql(err: Error, sql: &str) -> Error {
    match err {
        Error::Server(server) => Error::Server(server.with_sql(sql)),
        other => other,
    }
}
