//! Credentials for authenticating with Tapo devices.
//!
//! Both protocol generations authenticate with the TP-Link cloud account the
//! device was registered with. The plaintext never leaves this module except
//! through the protocol-specific derivations:
//!
//! - KLAP: [`Credentials::klap_auth_hash`], `sha256(sha1(username) + sha1(password))`
//! - securePassthrough: [`Credentials::passthrough_login`], base64 of the hex
//!   SHA-1 of the username and base64 of the password
//!
//! # Security
//!
//! Passwords are stored using [`SecretString`] from the `secrecy` crate to prevent
//! accidental logging or display.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretString};

use crate::crypto::hash::{sha1, sha256_concat};

/// Credentials for authenticating with Tapo devices.
///
/// # Example
///
/// ```
/// use tapo_core::Credentials;
///
/// let creds = Credentials::new("user@example.com", "password123");
/// assert_eq!(creds.username, "user@example.com");
/// assert_eq!(creds.klap_auth_hash().len(), 32);
/// ```
#[derive(Clone)]
pub struct Credentials {
    /// The TP-Link account username (an email address).
    pub username: String,
    /// The account password (protected from accidental logging).
    password: SecretString,
}

impl Credentials {
    /// Creates new credentials with the given username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Returns `true` if both username and password are empty.
    ///
    /// Tapo devices do not allow unauthenticated local control, so blank
    /// credentials are rejected by [`PlugConfig::validate`](crate::PlugConfig::validate).
    pub fn is_blank(&self) -> bool {
        self.username.is_empty() && self.password.expose_secret().is_empty()
    }

    /// Exposes the password for authentication purposes.
    ///
    /// Never log or display the returned value.
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }

    /// KLAP authentication hash: `sha256(sha1(username) + sha1(password))`.
    pub fn klap_auth_hash(&self) -> [u8; 32] {
        let username_hash = sha1(self.username.as_bytes());
        let password_hash = sha1(self.expose_password().as_bytes());
        sha256_concat(&[&username_hash, &password_hash])
    }

    /// `login_device` parameters for the securePassthrough protocol.
    ///
    /// The device expects the username as base64 of its lowercase hex SHA-1
    /// digest and the password as plain base64.
    pub fn passthrough_login(&self) -> PassthroughLogin {
        let digest_hex = hex::encode(sha1(self.username.as_bytes()));
        PassthroughLogin {
            username: STANDARD.encode(digest_hex),
            password: STANDARD.encode(self.expose_password()),
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

impl Eq for Credentials {}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Encoded `login_device` parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct PassthroughLogin {
    /// base64(hex(sha1(username)))
    pub username: String,
    /// base64(password)
    pub password: String,
}

impl fmt::Debug for PassthroughLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughLogin")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
