//! KLAP seed handshake.
//!
//! # Protocol Overview
//!
//! 1. **Handshake 1**: client posts 16 random bytes (`local_seed`) to
//!    `/app/handshake1`; the device answers `remote_seed(16) || server_hash`
//!    and sets `TP_SESSIONID=<id>;TIMEOUT=<seconds>`.
//! 2. The client checks `server_hash == sha256(local_seed + remote_seed + auth_hash)`.
//!    A mismatch means the device holds different credentials.
//! 3. **Handshake 2**: client posts `sha256(remote_seed + local_seed + auth_hash)`
//!    to `/app/handshake2` with the cookie. Status 200 completes mutual
//!    authentication.
//!
//! Session keys are then derived by
//! [`KlapEncryptionSession::new`](crate::crypto::KlapEncryptionSession::new).

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{Established, HandshakeStrategy, require_ok, session_cookie};
use crate::{
    Credentials,
    config::EncryptionType,
    crypto::{
        KlapEncryptionSession,
        hash::{SEED_LEN, random_seed},
        klap::{handshake1_server_hash, handshake2_payload},
    },
    envelope::CipherEnvelope,
    error::Error,
    transport::{CONTENT_TYPE_BINARY, HttpClient},
};

const HANDSHAKE1_PATH: &str = "/app/handshake1";
const HANDSHAKE2_PATH: &str = "/app/handshake2";

/// Seed-based handshake used by current Tapo firmware.
#[derive(Debug, Default)]
pub struct SeedKlapHandshake;

impl SeedKlapHandshake {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }

    /// Runs the exchange with a caller-chosen `local_seed`.
    pub async fn establish_with_seed(
        &self,
        client: &mut HttpClient,
        credentials: &Credentials,
        local_seed: [u8; SEED_LEN],
    ) -> Result<Established, Error> {
        client.clear_cookie();
        let auth_hash = credentials.klap_auth_hash();

        debug!(
            host = client.host(),
            port = client.port(),
            local_seed = %hex::encode(local_seed),
            "Performing KLAP handshake1"
        );

        let response = client
            .post(HANDSHAKE1_PATH, &local_seed, CONTENT_TYPE_BINARY)
            .await?;
        require_ok(&response, HANDSHAKE1_PATH)?;

        if response.body.len() < SEED_LEN {
            return Err(Error::AuthenticationFailed(format!(
                "handshake1 response has {} bytes, expected at least {}",
                response.body.len(),
                SEED_LEN
            )));
        }
        let (remote_seed, server_hash) = response.body.split_at(SEED_LEN);

        let expected = handshake1_server_hash(&local_seed, remote_seed, &auth_hash);
        if server_hash != expected {
            debug!(
                remote_seed = %hex::encode(remote_seed),
                server_hash = %hex::encode(server_hash),
                "Handshake1 server hash mismatch"
            );
            return Err(Error::AuthenticationFailed(
                "device did not prove knowledge of the credentials; check username and password"
                    .into(),
            ));
        }

        let cookie = session_cookie(&response).ok_or_else(|| {
            Error::AuthenticationFailed("handshake1 response without session cookie".into())
        })?;
        let ttl = cookie.ttl.ok_or_else(|| {
            Error::AuthenticationFailed("handshake1 session cookie without TIMEOUT".into())
        })?;
        let expires_at = cookie.expires_at(Instant::now());
        client.set_cookie(cookie.value);

        debug!(
            remote_seed = %hex::encode(remote_seed),
            ttl_secs = ttl.as_secs(),
            "Handshake1 verified, performing handshake2"
        );

        let payload = handshake2_payload(&local_seed, remote_seed, &auth_hash);
        let response = client
            .post(HANDSHAKE2_PATH, &payload, CONTENT_TYPE_BINARY)
            .await?;
        if !response.is_ok() {
            client.clear_cookie();
            return Err(Error::AuthenticationFailed(format!(
                "handshake2 returned status {}",
                response.status
            )));
        }

        let session = KlapEncryptionSession::new(&local_seed, remote_seed, &auth_hash);
        debug!(
            host = client.host(),
            seq = session.seq(),
            "KLAP handshake completed successfully"
        );

        Ok(Established {
            envelope: CipherEnvelope::Klap(session),
            expires_at,
        })
    }
}

#[async_trait]
impl HandshakeStrategy for SeedKlapHandshake {
    fn encryption_type(&self) -> EncryptionType {
        EncryptionType::Klap
    }

    async fn establish(
        &mut self,
        client: &mut HttpClient,
        credentials: &Credentials,
    ) -> Result<Established, Error> {
        self.establish_with_seed(client, credentials, random_seed())
            .await
    }
}
