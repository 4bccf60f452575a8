//! TLS/SSL support for MySQL connections.
//!
//! # MySQL TLS Handshake Flow
//!
//! 1. Server sends initial handshake with `CLIENT_SSL` capability
//! 2. Client sends the 32-byte SSLRequest packet
//! 3. Client performs the TLS handshake on the same socket
//! 4. Client sends the full handshake response over TLS, continuing the
//!    packet sequence
//!
//! TLS support requires the `tls` feature. Without it, any SSL mode other
//! than `Disable` and `Preferred` fails to connect.
//!
//! ```rust,ignore
//! use mywire_mysql::{MySqlConfig, MySqlConnection, SslMode, TlsConfig};
//!
//! let config = MySqlConfig::new()
//!     .host("db.example.com")
//!     .user("toy")
//!     .ssl_mode(SslMode::VerifyCa)
//!     .tls_config(TlsConfig::new().ca_cert("/etc/ssl/certs/ca.pem"));
//! let conn = MySqlConnection::connect(config)?;
//! ```

use mywire_core::Error;
use mywire_core::error::TransportErrorKind;

use crate::config::{SslMode, TlsConfig};
use crate::protocol::capabilities;

#[cfg(feature = "tls")]
use std::io::{Read, Write};
#[cfg(feature = "tls")]
use std::sync::Arc;

/// Whether the engine was built with TLS support.
pub const fn tls_available() -> bool {
    cfg!(feature = "tls")
}

/// Decide whether to upgrade the connection.
///
/// `Preferred` falls back to plain text when either side cannot do TLS;
/// every stricter mode fails instead.
pub fn negotiate_ssl(ssl_mode: SslMode, server_caps: u32) -> Result<bool, Error> {
    let server_supports = server_caps & capabilities::CLIENT_SSL != 0;

    match ssl_mode {
        SslMode::Disable => Ok(false),
        SslMode::Preferred => Ok(server_supports && tls_available()),
        SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity => {
            if !server_supports {
                Err(tls_error("SSL required but server does not support it"))
            } else if !tls_available() {
                Err(tls_error(
                    "SSL required but mywire-mysql was built without the `tls` feature",
                ))
            } else {
                Ok(true)
            }
        }
    }
}

fn tls_error(message: impl Into<String>) -> Error {
    Error::transport(TransportErrorKind::Tls, message)
}

/// Blocking TLS stream over an established socket.
#[cfg(feature = "tls")]
pub struct TlsStream<S: Read + Write> {
    conn: rustls::ClientConnection,
    stream: S,
}

#[cfg(feature = "tls")]
impl<S: Read + Write> std::fmt::Debug for TlsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsStream")
            .field("protocol_version", &self.conn.protocol_version())
            .field("is_handshaking", &self.conn.is_handshaking())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> TlsStream<S> {
    /// Perform the TLS handshake over `stream`.
    ///
    /// `server_name` is used for SNI and, under `VerifyIdentity`, for the
    /// certificate name check unless `tls_config.server_name` overrides it.
    pub fn new(
        mut stream: S,
        tls_config: &TlsConfig,
        server_name: &str,
        ssl_mode: SslMode,
    ) -> Result<Self, Error> {
        let config = build_client_config(tls_config, ssl_mode)?;

        let sni_name = tls_config.server_name.as_deref().unwrap_or(server_name);
        let server_name = rustls::pki_types::ServerName::try_from(sni_name.to_string())
            .map_err(|e| tls_error(format!("invalid server name '{}': {}", sni_name, e)))?;

        let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name)
            .map_err(|e| tls_error(format!("failed to create TLS connection: {}", e)))?;

        while conn.is_handshaking() {
            while conn.wants_write() {
                conn.write_tls(&mut stream)
                    .map_err(|e| tls_error(format!("TLS handshake write error: {}", e)))?;
            }
            stream
                .flush()
                .map_err(|e| tls_error(format!("TLS handshake flush error: {}", e)))?;

            if conn.wants_read() {
                let n = conn
                    .read_tls(&mut stream)
                    .map_err(|e| tls_error(format!("TLS handshake read error: {}", e)))?;
                if n == 0 {
                    return Err(tls_error("server closed the connection during TLS handshake"));
                }
                conn.process_new_packets()
                    .map_err(|e| tls_error(format!("TLS handshake error: {}", e)))?;
            }
        }

        tracing::debug!(
            protocol = ?conn.protocol_version(),
            cipher = ?conn.negotiated_cipher_suite().map(|s| s.suite()),
            "TLS established"
        );
        Ok(TlsStream { conn, stream })
    }

    /// Get the negotiated protocol version.
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.conn.protocol_version()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) if n > 0 => return Ok(n),
                Ok(_) => return Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            let n = self.conn.read_tls(&mut self.stream)?;
            if n == 0 {
                return Ok(0);
            }
            self.conn
                .process_new_packets()
                .map_err(|e| std::io::Error::other(format!("TLS error: {}", e)))?;
        }
    }
}

#[cfg(feature = "tls")]
impl<S: Read + Write> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.stream)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.conn.writer().flush()?;
        while self.conn.wants_write() {
            self.conn.write_tls(&mut self.stream)?;
        }
        self.stream.flush()
    }
}

/// Build the rustls client configuration for an SSL mode.
///
/// `Preferred` and `Required` encrypt without verifying the server, which
/// matches how MySQL clients treat those modes. `VerifyCa` checks the chain
/// only and `VerifyIdentity` also checks the host name.
#[cfg(feature = "tls")]
fn build_client_config(
    tls_config: &TlsConfig,
    ssl_mode: SslMode,
) -> Result<rustls::ClientConfig, Error> {
    use rustls::client::WebPkiServerVerifier;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .map_err(|e| tls_error(format!("failed to set TLS versions: {}", e)))?;

    let builder = match ssl_mode {
        SslMode::Disable => return Err(tls_error("TLS requested with SslMode::Disable")),
        SslMode::Preferred | SslMode::Required => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifiers::AcceptAny)),
        _ if tls_config.danger_skip_verify => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifiers::AcceptAny)),
        SslMode::VerifyCa => {
            let roots = Arc::new(load_roots(tls_config)?);
            let webpki = WebPkiServerVerifier::builder_with_provider(roots, provider)
                .build()
                .map_err(|e| tls_error(format!("failed to build verifier: {}", e)))?;
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(verifiers::ChainOnly(webpki)))
        }
        SslMode::VerifyIdentity => builder.with_root_certificates(load_roots(tls_config)?),
    };

    add_client_auth(builder, tls_config)
}

/// Trust anchors: the configured CA file, or the webpki root bundle.
#[cfg(feature = "tls")]
fn load_roots(tls_config: &TlsConfig) -> Result<rustls::RootCertStore, Error> {
    let mut root_store = rustls::RootCertStore::empty();
    let Some(ca_path) = &tls_config.ca_cert_path else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(root_store);
    };

    let certs = read_certs(ca_path)?;
    if certs.is_empty() {
        return Err(tls_error(format!(
            "no certificates found in CA file '{}'",
            ca_path.display()
        )));
    }
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| tls_error(format!("failed to add CA certificate: {}", e)))?;
    }
    Ok(root_store)
}

#[cfg(feature = "tls")]
fn read_certs(
    path: &std::path::Path,
) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, Error> {
    let file = std::fs::File::open(path).map_err(|e| {
        tls_error(format!(
            "failed to open certificate '{}': {}",
            path.display(),
            e
        ))
    })?;
    rustls_pemfile::certs(&mut std::io::BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("failed to parse '{}': {}", path.display(), e)))
}

#[cfg(feature = "tls")]
fn add_client_auth(
    builder: rustls::ConfigBuilder<rustls::ClientConfig, rustls::client::WantsClientCert>,
    tls_config: &TlsConfig,
) -> Result<rustls::ClientConfig, Error> {
    let (Some(cert_path), Some(key_path)) =
        (&tls_config.client_cert_path, &tls_config.client_key_path)
    else {
        return Ok(builder.with_no_client_auth());
    };

    let certs = read_certs(cert_path)?;
    if certs.is_empty() {
        return Err(tls_error(format!(
            "no certificates found in client cert file '{}'",
            cert_path.display()
        )));
    }

    let key_file = std::fs::File::open(key_path).map_err(|e| {
        tls_error(format!(
            "failed to open client key '{}': {}",
            key_path.display(),
            e
        ))
    })?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .map_err(|e| tls_error(format!("failed to parse client key: {}", e)))?
        .ok_or_else(|| tls_error(format!("no private key found in '{}'", key_path.display())))?;

    builder
        .with_client_auth_cert(certs, key)
        .map_err(|e| tls_error(format!("failed to configure client auth: {}", e)))
}

#[cfg(feature = "tls")]
mod verifiers {
    use std::sync::Arc;

    use rustls::client::WebPkiServerVerifier;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{CertificateError, DigitallySignedStruct, Error as RustlsError, SignatureScheme};

    /// Accepts any certificate. Encryption without authentication.
    #[derive(Debug)]
    pub(super) struct AcceptAny;

    impl ServerCertVerifier for AcceptAny {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, RustlsError> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }

    /// Verifies the chain but not the host name.
    #[derive(Debug)]
    pub(super) struct ChainOnly(pub(super) Arc<WebPkiServerVerifier>);

    impl ServerCertVerifier for ChainOnly {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            intermediates: &[CertificateDer<'_>],
            server_name: &ServerName<'_>,
            ocsp_response: &[u8],
            now: UnixTime,
        ) -> Result<ServerCertVerified, RustlsError> {
            match self.0.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ) {
                Err(RustlsError::InvalidCertificate(CertificateError::NotValidForName)) => {
                    Ok(ServerCertVerified::assertion())
                }
                other => other,
            }
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            self.0.verify_tls12_signature(message, cert, dss)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, RustlsError> {
            self.0.verify_tls13_signature(message, cert, dss)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.supported_verify_schemes()
        }
    }
}

/// TLS stream placeholder when the `tls` feature is disabled.
#[cfg(not(feature = "tls"))]
#[derive(Debug)]
pub struct TlsStream<S> {
    inner: S,
}

#[cfg(not(feature = "tls"))]
impl<S> TlsStream<S> {
    /// Always fails: the engine was built without TLS support.
    #[allow(unused_variables)]
    pub fn new(
        stream: S,
        tls_config: &TlsConfig,
        server_name: &str,
        ssl_mode: SslMode,
    ) -> Result<Self, Error> {
        Err(tls_error(
            "TLS requested but mywire-mysql was built without the `tls` feature",
        ))
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

#[cfg(not(feature = "tls"))]
impl<S> std::io::Read for TlsStream<S> {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("TLS support not compiled in"))
    }
}

#[cfg(not(feature = "tls"))]
impl<S> std::io::Write for TlsStream<S> {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("TLS support not compiled in"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::other("TLS support not compiled in"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_tls_error(err: &Error) -> bool {
        matches!(err, Error::Transport(t) if t.kind == TransportErrorKind::Tls)
    }

    #[test]
    fn test_negotiate_disable_never_upgrades() {
        assert!(!negotiate_ssl(SslMode::Disable, capabilities::CLIENT_SSL).unwrap());
        assert!(!negotiate_ssl(SslMode::Disable, 0).unwrap());
    }

    #[test]
    fn test_negotiate_preferred_falls_back() {
        assert!(!negotiate_ssl(SslMode::Preferred, 0).unwrap());
        assert_eq!(
            negotiate_ssl(SslMode::Preferred, capabilities::CLIENT_SSL).unwrap(),
            tls_available()
        );
    }

    #[test]
    fn test_negotiate_required_without_server_support() {
        for mode in [SslMode::Required, SslMode::VerifyCa, SslMode::VerifyIdentity] {
            let err = negotiate_ssl(mode, 0).unwrap_err();
            assert!(is_tls_error(&err), "{err:?}");
        }
    }

    #[cfg(not(feature = "tls"))]
    #[test]
    fn test_required_without_feature() {
        let err = negotiate_ssl(SslMode::Required, capabilities::CLIENT_SSL).unwrap_err();
        assert!(err.to_string().contains("tls"));
        let err = TlsStream::new((), &TlsConfig::new(), "localhost", SslMode::Required)
            .unwrap_err();
        assert!(is_tls_error(&err));
    }

    #[cfg(feature = "tls")]
    #[test]
    fn test_client_config_per_mode() {
        let tls = TlsConfig::new();
        assert!(build_client_config(&tls, SslMode::Required).is_ok());
        assert!(build_client_config(&tls, SslMode::VerifyIdentity).is_ok());
        assert!(build_client_config(&tls, SslMode::VerifyCa).is_ok());
        assert!(build_client_config(&tls, SslMode::Disable).is_err());

        let missing_ca = TlsConfig::new().ca_cert("/nonexistent/ca.pem");
        let err = build_client_config(&missing_ca, SslMode::VerifyCa).unwrap_err();
        assert!(is_tls_error(&err));
    }
}
