//! Authentication plugins and the connection-phase state machine.
//!
//! # mysql_native_password
//!
//! ```text
//! SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
//! ```
//!
//! # caching_sha2_password
//!
//! Fast auth (if cached on server):
//! ```text
//! XOR(SHA256(password), SHA256(SHA256(SHA256(password)) + seed))
//! ```
//!
//! Full auth sends the password in clear over TLS, or RSA-encrypted with the
//! server's public key otherwise. `sha256_password` always uses full auth.

use mywire_core::error::{AuthenticationError, AuthenticationErrorKind};
use mywire_core::{Error, Result};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::protocol::handshake::strip_nul;
use crate::protocol::{InitialHandshake, OkPacket, PacketReader, capabilities};

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1-based authentication (legacy default)
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256-based authentication (MySQL 8.0+ default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// RSA-based SHA256 authentication
    pub const SHA256_PASSWORD: &str = "sha256_password";
    /// Clear text password, only sensible over TLS
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";

    /// Is `name` a plugin the engine can answer?
    pub fn is_supported(name: &str) -> bool {
        matches!(
            name,
            MYSQL_NATIVE_PASSWORD | CACHING_SHA2_PASSWORD | SHA256_PASSWORD | MYSQL_CLEAR_PASSWORD
        )
    }
}

/// Status bytes of caching_sha2_password's AuthMoreData packets.
pub mod caching_sha2 {
    /// Request for public key (sent by the client)
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Fast auth success
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Full auth needed (switch to secure channel or RSA)
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// sha256_password asks for the server key with this byte.
const SHA256_REQUEST_PUBLIC_KEY: u8 = 0x01;

/// Compute the mysql_native_password response. Empty for an empty password.
pub fn mysql_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = &seed[..seed.len().min(20)];

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let stage3: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute the caching_sha2_password fast-auth response. Empty for an empty
/// password.
pub fn caching_sha2_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = strip_nul(seed);

    let password_hash: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let password_hash_hash: [u8; 32] = Sha256::digest(password_hash).into();

    let mut hasher = Sha256::new();
    hasher.update(password_hash_hash);
    hasher.update(seed);
    let scramble: [u8; 32] = hasher.finalize().into();

    password_hash
        .iter()
        .zip(scramble.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}

/// NUL-terminate the password and XOR it with the seed, repeating the seed.
pub fn xor_password_with_seed(password: &str, seed: &[u8]) -> Vec<u8> {
    let mut result = password.as_bytes().to_vec();
    result.push(0);
    if seed.is_empty() {
        return result;
    }
    for (i, byte) in result.iter_mut().enumerate() {
        *byte ^= seed[i % seed.len()];
    }
    result
}

/// Encrypt `password XOR seed` with the server's RSA key (OAEP, SHA-1).
///
/// The key may be a PKCS#8 `PUBLIC KEY` or a PKCS#1 `RSA PUBLIC KEY` PEM.
pub fn rsa_encrypt_password(password: &str, seed: &[u8], public_key_pem: &[u8]) -> Result<Vec<u8>> {
    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| crypto_error(format!("server public key is not valid PEM: {e}")))?;
    let pem = pem.trim_end_matches('\0');
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| crypto_error(format!("failed to parse server public key: {e}")))?;

    let plain = xor_password_with_seed(password, strip_nul(seed));
    key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &plain)
        .map_err(|e| crypto_error(format!("RSA encryption failed: {e}")))
}

fn crypto_error(message: String) -> Error {
    Error::authentication(AuthenticationErrorKind::Crypto, message)
}

/// Phase of the connection-phase exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    AwaitingGreeting,
    NegotiatingCapabilities,
    Authenticating,
    AuthSwitch,
    Ready,
    Failed,
}

/// What the caller should do after feeding a packet to the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this payload to the server, then read the next packet
    Respond(Vec<u8>),
    /// Read the next packet without sending anything
    Wait,
    /// Authentication succeeded
    Done(OkPacket),
}

/// Client side of the handshake and authentication exchange.
///
/// The exchange performs no I/O. The connection feeds it server packets and
/// writes back whatever it returns, which keeps every transition testable.
pub struct AuthExchange {
    phase: AuthPhase,
    password: String,
    server_public_key: Option<Vec<u8>>,
    max_switches: u32,
    switches: u32,
    server_capabilities: u32,
    plugin: String,
    seed: Vec<u8>,
    secure: bool,
    awaiting_public_key: bool,
}

impl AuthExchange {
    pub fn new(password: impl Into<String>, max_switches: u32) -> Self {
        Self {
            phase: AuthPhase::AwaitingGreeting,
            password: password.into(),
            server_public_key: None,
            max_switches,
            switches: 0,
            server_capabilities: 0,
            plugin: String::new(),
            seed: Vec::new(),
            secure: false,
            awaiting_public_key: false,
        }
    }

    /// Use a locally configured RSA key instead of requesting one.
    pub fn with_server_public_key(mut self, pem: Option<Vec<u8>>) -> Self {
        self.server_public_key = pem;
        self
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// The plugin currently in use.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Number of auth switches seen so far.
    pub fn switches(&self) -> u32 {
        self.switches
    }

    /// Mark the channel as encrypted, which allows clear-text credentials.
    pub fn set_secure(&mut self, secure: bool) {
        self.secure = secure;
    }

    /// Consume the server greeting.
    pub fn on_greeting(&mut self, payload: &[u8]) -> Result<InitialHandshake> {
        self.expect_phase(&[AuthPhase::AwaitingGreeting])?;
        let greeting = self.fail_on_err(InitialHandshake::parse(payload))?;
        self.server_capabilities = greeting.capabilities;
        self.plugin.clone_from(&greeting.auth_plugin);
        self.seed.clone_from(&greeting.auth_data);
        self.phase = AuthPhase::NegotiatingCapabilities;
        Ok(greeting)
    }

    /// Intersect the client's desired capabilities with the server's.
    pub fn negotiate(&mut self, desired: u32) -> Result<u32> {
        self.expect_phase(&[AuthPhase::NegotiatingCapabilities])?;
        let missing = capabilities::REQUIRED_FLAGS & !self.server_capabilities;
        if missing != 0 {
            self.phase = AuthPhase::Failed;
            return Err(Error::authentication(
                AuthenticationErrorKind::CapabilityMismatch,
                format!(
                    "server lacks required capabilities 0x{:08X} (offered 0x{:08X})",
                    missing, self.server_capabilities
                ),
            ));
        }
        Ok(desired & self.server_capabilities)
    }

    /// Produce the credential for the handshake response.
    pub fn initial_response(&mut self) -> Result<Vec<u8>> {
        self.expect_phase(&[AuthPhase::NegotiatingCapabilities])?;
        let response = self.compute_response();
        let response = self.fail_on_err(response)?;
        self.phase = AuthPhase::Authenticating;
        Ok(response)
    }

    /// Advance the exchange with a packet read from the server.
    pub fn on_packet(&mut self, payload: &[u8]) -> Result<AuthStep> {
        self.expect_phase(&[AuthPhase::Authenticating, AuthPhase::AuthSwitch])?;
        let step = self.transition(payload);
        self.fail_on_err(step)
    }

    fn transition(&mut self, payload: &[u8]) -> Result<AuthStep> {
        let Some((&tag, body)) = payload.split_first() else {
            return Err(Error::authentication(
                AuthenticationErrorKind::Malformed,
                "empty authentication packet",
            ));
        };

        match tag {
            0x00 => {
                let ok = PacketReader::new(payload)
                    .parse_ok_packet()
                    .map_err(malformed)?;
                self.phase = AuthPhase::Ready;
                Ok(AuthStep::Done(ok))
            }
            0xFF => {
                let err = PacketReader::new(payload)
                    .parse_err_packet()
                    .map_err(malformed)?;
                Err(Error::Authentication(AuthenticationError {
                    kind: AuthenticationErrorKind::Rejected,
                    code: Some(err.error_code),
                    sqlstate: Some(err.sql_state),
                    message: err.error_message,
                }))
            }
            0xFE => self.on_auth_switch(body),
            0x01 => self.on_more_data(body),
            other => Err(Error::authentication(
                AuthenticationErrorKind::Malformed,
                format!("unexpected authentication packet 0x{:02X}", other),
            )),
        }
    }

    fn on_auth_switch(&mut self, body: &[u8]) -> Result<AuthStep> {
        self.switches += 1;
        if self.switches > self.max_switches {
            return Err(Error::authentication(
                AuthenticationErrorKind::TooManySwitches,
                format!("server requested more than {} auth switches", self.max_switches),
            ));
        }

        let mut reader = PacketReader::new(body);
        let plugin = reader.read_null_string();
        let seed = strip_nul(reader.read_rest()).to_vec();
        tracing::debug!(plugin = %plugin, switch = self.switches, "auth switch");
        if !plugins::is_supported(&plugin) {
            return Err(Error::authentication(
                AuthenticationErrorKind::UnsupportedPlugin,
                format!("server switched to unsupported plugin: {}", plugin),
            ));
        }

        self.plugin = plugin;
        self.seed = seed;
        self.awaiting_public_key = false;
        self.phase = AuthPhase::AuthSwitch;
        self.compute_response().map(AuthStep::Respond)
    }

    fn on_more_data(&mut self, body: &[u8]) -> Result<AuthStep> {
        if self.awaiting_public_key {
            self.awaiting_public_key = false;
            return rsa_encrypt_password(&self.password, &self.seed, body).map(AuthStep::Respond);
        }

        let plugin = self.plugin.clone();
        match (plugin.as_str(), body) {
            (plugins::CACHING_SHA2_PASSWORD, [caching_sha2::FAST_AUTH_SUCCESS]) => {
                Ok(AuthStep::Wait)
            }
            (plugins::CACHING_SHA2_PASSWORD, [caching_sha2::PERFORM_FULL_AUTH]) => {
                tracing::debug!(secure = self.secure, "caching_sha2 full authentication");
                self.full_auth(caching_sha2::REQUEST_PUBLIC_KEY)
                    .map(AuthStep::Respond)
            }
            (plugins::SHA256_PASSWORD, key) if !key.is_empty() => {
                rsa_encrypt_password(&self.password, &self.seed, key).map(AuthStep::Respond)
            }
            (plugin, _) => Err(Error::authentication(
                AuthenticationErrorKind::Malformed,
                format!("unexpected auth data for plugin {}", plugin),
            )),
        }
    }

    /// Clear text over TLS, RSA with a known key, or a key request.
    fn full_auth(&mut self, request_key: u8) -> Result<Vec<u8>> {
        if self.secure {
            let mut clear = self.password.as_bytes().to_vec();
            clear.push(0);
            return Ok(clear);
        }
        if let Some(key) = &self.server_public_key {
            return rsa_encrypt_password(&self.password, &self.seed, key);
        }
        self.awaiting_public_key = true;
        Ok(vec![request_key])
    }

    fn compute_response(&mut self) -> Result<Vec<u8>> {
        let plugin = self.plugin.clone();
        match plugin.as_str() {
            plugins::MYSQL_NATIVE_PASSWORD => Ok(mysql_native_password(&self.password, &self.seed)),
            plugins::CACHING_SHA2_PASSWORD => Ok(caching_sha2_password(&self.password, &self.seed)),
            plugins::SHA256_PASSWORD => {
                if self.password.is_empty() {
                    Ok(vec![0])
                } else {
                    self.full_auth(SHA256_REQUEST_PUBLIC_KEY)
                }
            }
            plugins::MYSQL_CLEAR_PASSWORD => {
                if !self.secure {
                    tracing::warn!("sending clear text password over an unencrypted connection");
                }
                let mut clear = self.password.as_bytes().to_vec();
                clear.push(0);
                Ok(clear)
            }
            other => Err(Error::authentication(
                AuthenticationErrorKind::UnsupportedPlugin,
                format!("unsupported authentication plugin: {}", other),
            )),
        }
    }

    fn expect_phase(&mut self, allowed: &[AuthPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(Error::authentication(
            AuthenticationErrorKind::Malformed,
            format!("authentication exchange is in phase {:?}", self.phase),
        ))
    }

    fn fail_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.phase = AuthPhase::Failed;
        }
        result
    }
}

impl std::fmt::Debug for AuthExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthExchange")
            .field("phase", &self.phase)
            .field("plugin", &self.plugin)
            .field("switches", &self.switches)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

fn malformed(err: Error) -> Error {
    Error::authentication(
        AuthenticationErrorKind::Malformed,
        format!("malformed authentication packet: {}", err),
    )
}
