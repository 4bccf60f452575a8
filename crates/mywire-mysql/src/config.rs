//! Connection configuration.
//!
//! Provides connection parameters for establishing MySQL connections
//! including authentication, SSL, socket deadlines and decode options.

use std::path::PathBuf;
use std::time::Duration;

use mywire_core::Error;
use mywire_core::error::ConfigError;
use serde::{Deserialize, Serialize};

use crate::protocol::{capabilities, charset};

/// SSL mode for MySQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    /// Do not use SSL
    #[default]
    Disable,
    /// Prefer SSL if available, fall back to non-SSL
    Preferred,
    /// Require SSL connection, without certificate verification
    Required,
    /// Require SSL and verify the server certificate chain
    VerifyCa,
    /// Require SSL and verify the certificate matches the host name
    VerifyIdentity,
}

impl SslMode {
    /// Check if SSL should be attempted.
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Check if SSL is required.
    pub const fn is_required(self) -> bool {
        matches!(
            self,
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
        )
    }
}

/// Certificates and verification options for TLS connections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM file with the CA certificate(s) to trust
    pub ca_cert_path: Option<PathBuf>,
    /// PEM client certificate for mutual TLS
    pub client_cert_path: Option<PathBuf>,
    /// PEM private key matching `client_cert_path`
    pub client_key_path: Option<PathBuf>,
    /// Accept any server certificate
    pub danger_skip_verify: bool,
    /// Name used for SNI and identity checks instead of the host
    pub server_name: Option<String>,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Set the client certificate and key for mutual TLS.
    pub fn client_cert(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert_path = Some(cert.into());
        self.client_key_path = Some(key.into());
        self
    }

    /// Skip certificate verification entirely. Only for testing.
    pub fn skip_verify(mut self, skip: bool) -> Self {
        self.danger_skip_verify = skip;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// MySQL connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Database to select at connect time
    pub database: Option<String>,
    /// Character set (default: utf8mb4)
    pub charset: u8,
    /// TCP connect deadline (default: 30s)
    pub connect_timeout: Duration,
    /// Socket read deadline
    pub read_timeout: Option<Duration>,
    /// Socket write deadline
    pub write_timeout: Option<Duration>,
    /// SSL mode
    pub ssl_mode: SslMode,
    /// TLS certificates and verification options
    pub tls_config: TlsConfig,
    /// Connect attributes, sent in order
    pub attributes: Vec<(String, String)>,
    /// Largest incoming message accepted (default: 64MB)
    pub max_packet_size: u32,
    /// Allow several statements in one query (CLIENT_MULTI_STATEMENTS)
    pub multi_statements: bool,
    /// Decode TINYINT(1) columns as booleans
    pub tiny_as_bool: bool,
    /// Decode BIT columns through their decimal string form
    pub bit_as_text: bool,
    /// PEM RSA key used for sha256-based full authentication
    pub server_public_key: Option<String>,
    /// Auth switch requests tolerated before giving up
    pub max_auth_switches: u32,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: String::new(),
            password: None,
            database: None,
            charset: charset::DEFAULT_CHARSET,
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
            ssl_mode: SslMode::default(),
            tls_config: TlsConfig::default(),
            attributes: Vec::new(),
            max_packet_size: 64 * 1024 * 1024,
            multi_statements: true,
            tiny_as_bool: true,
            bit_as_text: false,
            server_public_key: None,
            max_auth_switches: 4,
        }
    }
}

impl MySqlConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set id sent in the handshake.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the socket read deadline. Expiry closes the connection.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the socket write deadline. Expiry closes the connection.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls_config = tls;
        self
    }

    /// Set a connection attribute, replacing an earlier value for `key`.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((key, value)),
        }
        self
    }

    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    pub fn multi_statements(mut self, enabled: bool) -> Self {
        self.multi_statements = enabled;
        self
    }

    pub fn tiny_as_bool(mut self, enabled: bool) -> Self {
        self.tiny_as_bool = enabled;
        self
    }

    pub fn bit_as_text(mut self, enabled: bool) -> Self {
        self.bit_as_text = enabled;
        self
    }

    /// Use this PEM RSA public key instead of requesting the server's.
    pub fn server_public_key(mut self, pem: impl Into<String>) -> Self {
        self.server_public_key = Some(pem.into());
        self
    }

    pub fn max_auth_switches(mut self, max: u32) -> Self {
        self.max_auth_switches = max;
        self
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the capability flags the client would like to use.
    ///
    /// The connection intersects these with the server's flags. Compression
    /// and LOCAL INFILE are never requested.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::DEFAULT_CLIENT_FLAGS;

        if self.database.is_some() {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }
        if self.ssl_mode.should_try_ssl() {
            flags |= capabilities::CLIENT_SSL;
        }
        if !self.attributes.is_empty() {
            flags |= capabilities::CLIENT_CONNECT_ATTRS;
        }
        if self.multi_statements {
            flags |= capabilities::CLIENT_MULTI_STATEMENTS;
        }

        flags
    }

    /// Check the configuration for combinations that cannot work.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.is_empty() {
            return Err(config_error("host must not be empty"));
        }
        if self.user.is_empty() {
            return Err(config_error("user must not be empty"));
        }
        if self.max_packet_size == 0 {
            return Err(config_error("max_packet_size must be positive"));
        }
        let tls = &self.tls_config;
        if tls.client_cert_path.is_some() != tls.client_key_path.is_some() {
            return Err(config_error(
                "client certificate and client key must be set together",
            ));
        }
        if matches!(self.ssl_mode, SslMode::VerifyCa | SslMode::VerifyIdentity)
            && tls.danger_skip_verify
        {
            return Err(config_error(format!(
                "ssl_mode {:?} conflicts with danger_skip_verify",
                self.ssl_mode
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        message: message.into(),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::capabilities::*;

    #[test]
    fn test_config_builder() {
        let config = MySqlConfig::new()
            .host("db.example.com")
            .port(3307)
            .user("toy")
            .password("secret")
            .database("shop")
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(5))
            .ssl_mode(SslMode::Required)
            .attribute("program_name", "toyshop")
            .attribute("program_name", "toyshop-admin")
            .max_auth_switches(2);

        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "toy");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.database.as_deref(), Some("shop"));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.write_timeout, None);
        assert_eq!(config.ssl_mode, SslMode::Required);
        assert_eq!(
            config.attributes,
            vec![("program_name".to_string(), "toyshop-admin".to_string())]
        );
        assert_eq!(config.max_auth_switches, 2);
        assert_eq!(config.socket_addr(), "db.example.com:3307");
    }

    #[test]
    fn test_default_config() {
        let config = MySqlConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, 255);
        assert_eq!(config.ssl_mode, SslMode::Disable);
        assert_eq!(config.max_packet_size, 64 * 1024 * 1024);
        assert!(config.multi_statements);
        assert!(config.tiny_as_bool);
        assert!(!config.bit_as_text);
        assert_eq!(config.max_auth_switches, 4);
    }

    #[test]
    fn test_ssl_mode_properties() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(!SslMode::Disable.is_required());
        assert!(SslMode::Preferred.should_try_ssl());
        assert!(!SslMode::Preferred.is_required());
        assert!(SslMode::Required.is_required());
        assert!(SslMode::VerifyCa.is_required());
        assert!(SslMode::VerifyIdentity.is_required());
    }

    #[test]
    fn test_capability_flags() {
        let flags = MySqlConfig::new().capability_flags();
        assert_ne!(flags & CLIENT_PROTOCOL_41, 0);
        assert_ne!(flags & CLIENT_SECURE_CONNECTION, 0);
        assert_ne!(flags & CLIENT_MULTI_STATEMENTS, 0);
        assert_eq!(flags & CLIENT_CONNECT_WITH_DB, 0);
        assert_eq!(flags & CLIENT_SSL, 0);
        assert_eq!(flags & CLIENT_COMPRESS, 0);
        assert_eq!(flags & CLIENT_LOCAL_FILES, 0);

        let flags = MySqlConfig::new()
            .database("shop")
            .ssl_mode(SslMode::Preferred)
            .attribute("k", "v")
            .multi_statements(false)
            .capability_flags();
        assert_ne!(flags & CLIENT_CONNECT_WITH_DB, 0);
        assert_ne!(flags & CLIENT_SSL, 0);
        assert_ne!(flags & CLIENT_CONNECT_ATTRS, 0);
        assert_eq!(flags & CLIENT_MULTI_STATEMENTS, 0);
    }

    #[test]
    fn test_validate() {
        assert!(MySqlConfig::new().user("toy").validate().is_ok());
        assert!(matches!(
            MySqlConfig::new().validate(),
            Err(Error::Config(_))
        ));

        let half_mtls = TlsConfig {
            client_cert_path: Some("client.pem".into()),
            ..TlsConfig::default()
        };
        assert!(
            MySqlConfig::new()
                .user("toy")
                .tls_config(half_mtls)
                .validate()
                .is_err()
        );

        let conflicting = MySqlConfig::new()
            .user("toy")
            .ssl_mode(SslMode::VerifyIdentity)
            .tls_config(TlsConfig::new().skip_verify(true));
        assert!(conflicting.validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let config = MySqlConfig::new()
            .user("toy")
            .ssl_mode(SslMode::VerifyCa)
            .tls_config(TlsConfig::new().ca_cert("/etc/ssl/ca.pem"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"verify_ca\""));
        let back: MySqlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let partial: MySqlConfig =
            serde_json::from_str(r#"{"user":"toy","port":3307}"#).unwrap();
        assert_eq!(partial.port, 3307);
        assert_eq!(partial.host, "localhost");
    }
}
