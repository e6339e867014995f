//! Legacy RSA handshake with securePassthrough login.
//!
//! # Protocol Overview
//!
//! 1. **handshake**: client posts `{"method":"handshake","params":{"key":<PEM>}}`
//!    to `/app` in the clear; the device answers with the session key and IV
//!    encrypted to that public key and usually sets `TP_SESSIONID`.
//! 2. **login_device**: sent through the new securePassthrough cipher; the
//!    reply carries the `token` appended to every later request path.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Established, HandshakeStrategy, require_ok, session_cookie};
use crate::{
    Credentials, commands,
    config::EncryptionType,
    crypto::{RsaKeyPair, passthrough::RSA_KEY_BITS},
    envelope::{CipherEnvelope, PassthroughEnvelope},
    error::Error,
    response::DeviceReply,
    transport::{CONTENT_TYPE_JSON, HttpClient, HttpResponse},
};

const APP_PATH: &str = "/app";

/// RSA key exchange used by older Tapo firmware.
///
/// The key pair is generated on first use and reused by later handshakes.
#[derive(Debug, Default)]
pub struct LegacyRsaHandshake {
    key_pair: Option<Arc<RsaKeyPair>>,
}

impl LegacyRsaHandshake {
    /// Creates the strategy; the key pair is generated lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy with a pre-generated key pair.
    pub fn with_key_pair(key_pair: RsaKeyPair) -> Self {
        Self {
            key_pair: Some(Arc::new(key_pair)),
        }
    }

    async fn key_pair(&mut self) -> Result<Arc<RsaKeyPair>, Error> {
        if let Some(key_pair) = &self.key_pair {
            return Ok(Arc::clone(key_pair));
        }

        debug!(bits = RSA_KEY_BITS, "Generating RSA key pair");
        let key_pair = tokio::task::spawn_blocking(|| RsaKeyPair::generate(RSA_KEY_BITS))
            .await
            .map_err(|e| Error::Protocol(format!("key generation task failed: {}", e)))??;

        let key_pair = Arc::new(key_pair);
        self.key_pair = Some(Arc::clone(&key_pair));
        Ok(key_pair)
    }
}

/// Adopts the `Set-Cookie` of `response` unless a cookie is already held.
/// Returns the cookie lifetime when one was adopted.
fn adopt_cookie(client: &mut HttpClient, response: &HttpResponse) -> Option<Instant> {
    if client.cookie().is_some() {
        return None;
    }
    let cookie = session_cookie(response)?;
    client.set_cookie(cookie.value.clone());
    cookie.expires_at(Instant::now())
}

#[async_trait]
impl HandshakeStrategy for LegacyRsaHandshake {
    fn encryption_type(&self) -> EncryptionType {
        EncryptionType::Aes
    }

    async fn establish(
        &mut self,
        client: &mut HttpClient,
        credentials: &Credentials,
    ) -> Result<Established, Error> {
        client.clear_cookie();
        let key_pair = self.key_pair().await?;

        debug!(
            host = client.host(),
            port = client.port(),
            "Performing securePassthrough handshake"
        );

        let request = commands::handshake(key_pair.public_key_pem()).to_json()?;
        let response = client
            .post(APP_PATH, request.as_bytes(), CONTENT_TYPE_JSON)
            .await?;
        require_ok(&response, APP_PATH)?;
        let mut expires_at = adopt_cookie(client, &response);

        let reply: DeviceReply = serde_json::from_slice(&response.body)?;
        let result = reply.into_result()?;
        let encrypted_key = result
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("handshake reply without key".into()))?;
        let cipher = key_pair.open_key_exchange(encrypted_key).map_err(|e| {
            client.clear_cookie();
            Error::AuthenticationFailed(format!("key exchange failed: {}", e))
        })?;

        let mut envelope = CipherEnvelope::Passthrough(PassthroughEnvelope::new(cipher));

        let login = credentials.passthrough_login();
        let payload = commands::login_device(&login.username, &login.password).to_json()?;
        let sealed = envelope.seal(payload.as_bytes())?;
        let response = client
            .post(&sealed.path, &sealed.body, sealed.content_type)
            .await?;
        require_ok(&response, &sealed.path)?;
        if let Some(adopted) = adopt_cookie(client, &response) {
            expires_at = Some(adopted);
        }

        let inner = envelope.open(&sealed, &response.body).map_err(|e| match e {
            Error::Device(code) => {
                Error::AuthenticationFailed(format!("login_device rejected: {}", code))
            }
            other => other,
        })?;
        let reply: DeviceReply = serde_json::from_slice(&inner)?;
        if !reply.is_success() {
            client.clear_cookie();
            return Err(Error::AuthenticationFailed(format!(
                "login_device rejected: {}",
                reply.code()
            )));
        }
        let token = reply
            .result
            .as_ref()
            .and_then(|result| result.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("login_device reply without token".into()))?;

        if let Some(passthrough) = envelope.as_passthrough_mut() {
            passthrough.set_token(token);
        }

        debug!(
            host = client.host(),
            "securePassthrough handshake completed successfully"
        );

        Ok(Established {
            envelope,
            expires_at,
        })
    }
}
