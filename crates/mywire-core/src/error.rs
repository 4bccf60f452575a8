//! Error types for wire protocol operations.
//!
//! Every failure surfaced by the engine falls into one of a small set of
//! families. Transport, protocol and authentication failures are fatal to the
//! connection they occur on; server errors usually are not.

use std::fmt;

/// The primary error type for all engine operations.
#[derive(Debug)]
pub enum Error {
    /// Socket failure, framing failure or sequence mismatch
    Transport(TransportError),
    /// Handshake or authentication failure
    Authentication(AuthenticationError),
    /// ERR packet returned by the server while executing a command
    Server(ServerError),
    /// Response shape inconsistent with what the engine expected
    Protocol(ProtocolError),
    /// A new command was issued while a previous result was still pending
    OutOfSequence(OutOfSequenceError),
    /// Caller mistake detected before anything reached the wire
    Usage(UsageError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
}

#[derive(Debug)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Underlying socket read/write failed
    Io,
    /// A socket deadline expired
    Timeout,
    /// Packet sequence id did not match the expected value
    SequenceMismatch,
    /// Packet envelope was malformed (e.g. oversized message)
    Framing,
    /// The connection is closed and refuses further commands
    Closed,
    /// TLS negotiation failed or was required but unavailable
    Tls,
}

#[derive(Debug)]
pub struct AuthenticationError {
    pub kind: AuthenticationErrorKind,
    /// Server error code when the server rejected the attempt
    pub code: Option<u16>,
    pub sqlstate: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationErrorKind {
    /// Server answered with an ERR packet
    Rejected,
    /// Server asked for an authentication plugin we do not implement
    UnsupportedPlugin,
    /// Server kept switching plugins past the configured limit
    TooManySwitches,
    /// Server lacks a capability the engine requires
    CapabilityMismatch,
    /// Handshake packet could not be parsed
    Malformed,
    /// Password scrambling or RSA encryption failed
    Crypto,
}

#[derive(Debug)]
pub struct ServerError {
    pub kind: ServerErrorKind,
    pub code: u16,
    pub sqlstate: String,
    pub message: String,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Table, column or database not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Deadlock detected
    Deadlock,
    /// Lock wait timed out
    LockTimeout,
    /// Query or connection was killed
    Killed,
    /// Server is shutting down
    Shutdown,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ProtocolError {
    pub message: String,
    /// Byte offset inside the offending payload, when known
    pub offset: Option<usize>,
    pub raw_data: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct OutOfSequenceError {
    /// The command the caller attempted
    pub attempted: &'static str,
    /// The connection state at the time
    pub state: &'static str,
}

#[derive(Debug)]
pub struct UsageError {
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServerErrorKind {
    /// Classify a MySQL/MariaDB server error code.
    pub fn from_code(code: u16) -> Self {
        match code {
            1064 | 1149 => ServerErrorKind::Syntax,
            1022 | 1048 | 1062 | 1169 | 1216 | 1217 | 1451 | 1452 | 1557 | 1586 | 3819 | 4025 => {
                ServerErrorKind::Constraint
            }
            1046 | 1049 | 1051 | 1054 | 1091 | 1146 | 1243 | 1305 => ServerErrorKind::NotFound,
            1044 | 1045 | 1142 | 1143 | 1227 | 1370 => ServerErrorKind::Permission,
            1264 | 1265 | 1406 => ServerErrorKind::DataTruncation,
            1213 => ServerErrorKind::Deadlock,
            1205 => ServerErrorKind::LockTimeout,
            1317 | 1927 | 3024 => ServerErrorKind::Killed,
            1053 => ServerErrorKind::Shutdown,
            _ => ServerErrorKind::Database,
        }
    }
}

impl ServerError {
    /// Build a server error from the fields of an ERR packet.
    pub fn new(code: u16, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ServerErrorKind::from_code(code),
            code,
            sqlstate: sqlstate.into(),
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the statement text that produced this error.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Does this error leave the connection unusable?
    ///
    /// A killed connection or a shutting-down server terminates the session
    /// after reporting the error; 1317 (query interrupted) does not.
    pub fn is_fatal(&self) -> bool {
        matches!(self.code, 1053 | 1927)
    }

    /// Is this a duplicate key error?
    pub fn is_duplicate_key(&self) -> bool {
        self.code == 1062
    }

    /// Is this a foreign key violation?
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self.code, 1216 | 1217 | 1451 | 1452)
    }
}

impl Error {
    /// Shorthand for a transport error without an underlying cause.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Error::Transport(TransportError {
            kind,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a protocol violation at a known byte offset.
    pub fn protocol(message: impl Into<String>, offset: Option<usize>) -> Self {
        Error::Protocol(ProtocolError {
            message: message.into(),
            offset,
            raw_data: None,
        })
    }

    /// Shorthand for an authentication error not reported by the server.
    pub fn authentication(kind: AuthenticationErrorKind, message: impl Into<String>) -> Self {
        Error::Authentication(AuthenticationError {
            kind,
            code: None,
            sqlstate: None,
            message: message.into(),
        })
    }

    /// Shorthand for a caller mistake.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(UsageError {
            message: message.into(),
        })
    }

    /// Must the connection that produced this error be discarded?
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Protocol(_) | Error::Authentication(_) => true,
            Error::Server(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Is this a retryable error (deadlock, lock wait, socket timeout)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Server(e) => matches!(
                e.kind,
                ServerErrorKind::Deadlock | ServerErrorKind::LockTimeout
            ),
            Error::Transport(e) => e.kind == TransportErrorKind::Timeout,
            _ => false,
        }
    }

    /// Is this a connection-level error that requires reconnecting?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Authentication(_))
    }

    /// Get SQLSTATE if available (e.g., "23000" for integrity violations)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(e) => Some(&e.sqlstate),
            Error::Authentication(e) => e.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the server error code if available.
    pub fn server_code(&self) -> Option<u16> {
        match self {
            Error::Server(e) => Some(e.code),
            Error::Authentication(e) => e.code,
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Server(e) => e.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Authentication(e) => write!(f, "Authentication error: {}", e),
            Error::Server(e) => write!(f, "Server error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol violation: {}", e),
            Error::OutOfSequence(e) => write!(f, "Out of sequence: {}", e),
            Error::Usage(e) => write!(f, "Usage error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, &self.sqlstate) {
            (Some(code), Some(state)) => write!(f, "[{} {}] {}", code, state, self.message),
            (Some(code), None) => write!(f, "[{}] {}", code, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (error {}, SQLSTATE {})",
            self.message, self.code, self.sqlstate
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} at byte offset {}", self.message, offset),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for OutOfSequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {} while the connection is {}; drain the pending result first",
            self.attempted, self.state
        )
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportErrorKind::Timeout
            }
            _ => TransportErrorKind::Io,
        };
        Error::Transport(TransportError {
            kind,
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<AuthenticationError> for Error {
    fn from(err: AuthenticationError) -> Self {
        Error::Authentication(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<OutOfSequenceError> for Error {
    fn from(err: OutOfSequenceError) -> Self {
        Error::OutOfSequence(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
