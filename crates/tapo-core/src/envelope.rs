//! Cipher envelope: wraps inner commands for the wire and unwraps replies.
//!
//! | variant     | request                                       | reply                         |
//! |-------------|-----------------------------------------------|-------------------------------|
//! | KLAP        | `POST /app/request?seq=N`, signature + AES    | signature + AES               |
//! | passthrough | `POST /app?token=T`, `securePassthrough` JSON | `{"result":{"response":b64}}` |

use serde_json::Value;

use crate::{
    commands,
    crypto::{KlapEncryptionSession, PassthroughCipher},
    error::Error,
    response::DeviceReply,
    transport::{CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON},
};

/// A request ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRequest {
    /// Path and query string.
    pub path: String,
    /// Request body.
    pub body: Vec<u8>,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// KLAP sequence number the request is bound to.
    pub seq: Option<i32>,
}

/// Key material of an authenticated session, one variant per protocol
/// generation.
#[derive(Debug, Clone)]
pub enum CipherEnvelope {
    /// Sequence-bound KLAP cipher.
    Klap(KlapEncryptionSession),
    /// Static-key securePassthrough cipher.
    Passthrough(PassthroughEnvelope),
}

/// securePassthrough cipher plus the login token.
#[derive(Debug, Clone)]
pub struct PassthroughEnvelope {
    cipher: PassthroughCipher,
    token: Option<String>,
}

impl PassthroughEnvelope {
    /// Creates an envelope that has not logged in yet.
    pub fn new(cipher: PassthroughCipher) -> Self {
        Self {
            cipher,
            token: None,
        }
    }

    /// Token appended to request paths, once logged in.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Stores the `login_device` token.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn path(&self) -> String {
        match &self.token {
            Some(token) => format!("/app?token={}", token),
            None => "/app".to_string(),
        }
    }
}

impl CipherEnvelope {
    /// Encrypts `payload` into a postable request. For KLAP this advances the
    /// sequence number.
    pub fn seal(&mut self, payload: &[u8]) -> Result<SealedRequest, Error> {
        match self {
            CipherEnvelope::Klap(session) => {
                let (body, seq) = session.encrypt(payload);
                Ok(SealedRequest {
                    path: format!("/app/request?seq={}", seq),
                    body,
                    content_type: CONTENT_TYPE_BINARY,
                    seq: Some(seq),
                })
            }
            CipherEnvelope::Passthrough(envelope) => {
                let encrypted = envelope.cipher.encrypt(payload);
                let outer = commands::secure_passthrough(&encrypted).to_json()?;
                Ok(SealedRequest {
                    path: envelope.path(),
                    body: outer.into_bytes(),
                    content_type: CONTENT_TYPE_JSON,
                    seq: None,
                })
            }
        }
    }

    /// Decrypts the reply body to `sealed` into the inner JSON bytes.
    ///
    /// A passthrough reply whose outer `error_code` is nonzero is returned as
    /// [`Error::Device`].
    pub fn open(&self, sealed: &SealedRequest, body: &[u8]) -> Result<Vec<u8>, Error> {
        match self {
            CipherEnvelope::Klap(session) => {
                let seq = sealed
                    .seq
                    .ok_or_else(|| Error::Protocol("KLAP request without sequence".into()))?;
                Ok(session.decrypt_reply(body, seq)?)
            }
            CipherEnvelope::Passthrough(envelope) => {
                let outer: DeviceReply = serde_json::from_slice(body)?;
                let result = outer.into_result()?;
                let response = result
                    .get("response")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::Protocol("securePassthrough reply without response".into())
                    })?;
                Ok(envelope.cipher.decrypt(response)?)
            }
        }
    }

    /// Mutable access to the passthrough half, if this is one.
    pub fn as_passthrough_mut(&mut self) -> Option<&mut PassthroughEnvelope> {
        match self {
            CipherEnvelope::Passthrough(envelope) => Some(envelope),
            CipherEnvelope::Klap(_) => None,
        }
    }

    /// Current KLAP sequence number.
    pub fn seq(&self) -> Option<i32> {
        match self {
            CipherEnvelope::Klap(session) => Some(session.seq()),
            CipherEnvelope::Passthrough(_) => None,
        }
    }
}
