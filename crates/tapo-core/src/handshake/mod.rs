//! Session establishment for the two Tapo protocol generations.
//!
//! - [`SeedKlapHandshake`]: two-step seed exchange (current firmware)
//! - [`LegacyRsaHandshake`]: RSA key exchange plus `login_device` (older firmware)
//!
//! The strategy is picked once from [`EncryptionType`] when the session
//! manager is built; every re-handshake runs the same strategy.

pub mod klap;
pub mod passthrough;

pub use klap::SeedKlapHandshake;
pub use passthrough::LegacyRsaHandshake;

use std::time::Instant;

use async_trait::async_trait;

use crate::{
    Credentials,
    config::EncryptionType,
    envelope::CipherEnvelope,
    error::Error,
    transport::{HttpClient, HttpResponse, SessionCookie},
};

/// Result of a successful handshake.
#[derive(Debug)]
pub struct Established {
    /// Cipher for the new session.
    pub envelope: CipherEnvelope,
    /// When the device forgets the session; `None` if it never said.
    pub expires_at: Option<Instant>,
}

/// A protocol generation's key exchange.
///
/// On success the client carries the new session cookie (if any). On failure
/// nothing from the attempt may be reused.
#[async_trait]
pub trait HandshakeStrategy: Send + Sync {
    /// Protocol generation implemented by this strategy.
    fn encryption_type(&self) -> EncryptionType;

    /// Runs the full exchange against the device behind `client`.
    async fn establish(
        &mut self,
        client: &mut HttpClient,
        credentials: &Credentials,
    ) -> Result<Established, Error>;
}

/// Returns the strategy for `encryption`.
pub fn strategy_for(encryption: EncryptionType) -> Box<dyn HandshakeStrategy> {
    match encryption {
        EncryptionType::Klap => Box::new(SeedKlapHandshake::new()),
        EncryptionType::Aes => Box::new(LegacyRsaHandshake::new()),
    }
}

/// Maps a non-200 response to [`Error::Http`].
pub(crate) fn require_ok(response: &HttpResponse, path: &str) -> Result<(), Error> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(Error::Http {
            status: response.status,
            path: path.split('?').next().unwrap_or(path).to_string(),
        })
    }
}

/// Parses `Set-Cookie` from `response`, if present.
pub(crate) fn session_cookie(response: &HttpResponse) -> Option<SessionCookie> {
    response.set_cookie.as_deref().and_then(SessionCookie::parse)
}
