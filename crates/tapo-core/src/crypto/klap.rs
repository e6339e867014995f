//! KLAP key derivation and session cipher.
//!
//! After the two-step handshake both sides hold `local_seed`, `remote_seed`
//! and the credential `auth_hash`. Every session secret is a SHA-256 over a
//! short label followed by those three values:
//!
//! | secret    | derivation                                   | bytes used |
//! |-----------|----------------------------------------------|------------|
//! | key       | `sha256("lsk" + local + remote + auth)`      | first 16   |
//! | iv prefix | `sha256("iv" + local + remote + auth)`       | first 12   |
//! | seq       | same digest as the iv prefix                 | last 4, big-endian `i32` |
//! | sig key   | `sha256("ldk" + local + remote + auth)`      | first 28   |
//!
//! Each request increments `seq` first, then encrypts with IV
//! `iv_prefix || seq` and prepends `sha256(sig_key || seq || ciphertext)`.

use std::fmt;

use super::{
    CryptoError,
    cbc::{self, Padding},
    hash::sha256_concat,
};

/// Length of the signature prefix on every request and response body.
pub const SIGNATURE_LEN: usize = 32;

/// Expected `server_hash` in the handshake1 response:
/// `sha256(local_seed + remote_seed + auth_hash)`.
pub fn handshake1_server_hash(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    sha256_concat(&[local_seed, remote_seed, auth_hash])
}

/// Body of the handshake2 request: `sha256(remote_seed + local_seed + auth_hash)`.
pub fn handshake2_payload(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> [u8; 32] {
    sha256_concat(&[remote_seed, local_seed, auth_hash])
}

/// Sequence-bound AES-128-CBC cipher for an established KLAP session.
#[derive(Clone)]
pub struct KlapEncryptionSession {
    key: [u8; 16],
    iv_prefix: [u8; 12],
    sig_key: [u8; 28],
    seq: i32,
}

impl KlapEncryptionSession {
    /// Derives the session keys from the handshake seeds and auth hash.
    pub fn new(local_seed: &[u8], remote_seed: &[u8], auth_hash: &[u8]) -> Self {
        let key_digest = sha256_concat(&[b"lsk", local_seed, remote_seed, auth_hash]);
        let iv_digest = sha256_concat(&[b"iv", local_seed, remote_seed, auth_hash]);
        let sig_digest = sha256_concat(&[b"ldk", local_seed, remote_seed, auth_hash]);

        let mut key = [0u8; 16];
        key.copy_from_slice(&key_digest[..16]);
        let mut iv_prefix = [0u8; 12];
        iv_prefix.copy_from_slice(&iv_digest[..12]);
        let mut sig_key = [0u8; 28];
        sig_key.copy_from_slice(&sig_digest[..28]);
        let mut seq_bytes = [0u8; 4];
        seq_bytes.copy_from_slice(&iv_digest[28..]);

        Self {
            key,
            iv_prefix,
            sig_key,
            seq: i32::from_be_bytes(seq_bytes),
        }
    }

    /// The sequence number used by the most recent [`encrypt`](Self::encrypt)
    /// (or the initial value before any request).
    pub fn seq(&self) -> i32 {
        self.seq
    }

    /// Encrypts the next request, advancing the sequence number.
    ///
    /// Returns the wire body (`signature || ciphertext`) and the sequence
    /// number it is bound to. The plaintext is space-padded.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> (Vec<u8>, i32) {
        self.seq = self.seq.wrapping_add(1);
        (self.encrypt_with_seq(plaintext, self.seq), self.seq)
    }

    /// Encrypts `plaintext` under an explicit sequence number without touching
    /// the session counter.
    pub fn encrypt_with_seq(&self, plaintext: &[u8], seq: i32) -> Vec<u8> {
        let ciphertext = cbc::encrypt(&self.key, &self.iv_for_seq(seq), plaintext, Padding::Spaces);
        let signature = self.signature(seq, &ciphertext);

        let mut body = Vec::with_capacity(SIGNATURE_LEN + ciphertext.len());
        body.extend_from_slice(&signature);
        body.extend_from_slice(&ciphertext);
        body
    }

    /// Inverse of [`encrypt`](Self::encrypt): decrypts a body bound to `seq`
    /// and returns the block plaintext, space padding included.
    pub fn decrypt(&self, body: &[u8], seq: i32) -> Result<Vec<u8>, CryptoError> {
        self.open(body, seq, Padding::Spaces)
    }

    /// Decrypts a device reply bound to `seq`. Devices pad replies with
    /// PKCS#7, which is removed.
    ///
    /// The signature prefix is skipped, not checked: devices in the field
    /// are driven the same way by every known client.
    pub fn decrypt_reply(&self, body: &[u8], seq: i32) -> Result<Vec<u8>, CryptoError> {
        self.open(body, seq, Padding::Pkcs7)
    }

    fn open(&self, body: &[u8], seq: i32, padding: Padding) -> Result<Vec<u8>, CryptoError> {
        if body.len() < SIGNATURE_LEN {
            return Err(CryptoError::TooShort {
                expected: SIGNATURE_LEN,
                actual: body.len(),
            });
        }
        cbc::decrypt(&self.key, &self.iv_for_seq(seq), &body[SIGNATURE_LEN..], padding)
    }

    /// `sha256(sig_key || seq || ciphertext)`.
    pub fn signature(&self, seq: i32, ciphertext: &[u8]) -> [u8; 32] {
        sha256_concat(&[&self.sig_key, &seq.to_be_bytes(), ciphertext])
    }

    /// Recomputes the signature over a response body and compares it with its
    /// prefix. Not used on the request path.
    pub fn verify(&self, body: &[u8], seq: i32) -> bool {
        body.len() >= SIGNATURE_LEN
            && self.signature(seq, &body[SIGNATURE_LEN..])[..] == body[..SIGNATURE_LEN]
    }

    /// Compute the CBC IV for a given sequence number.
    fn iv_for_seq(&self, seq: i32) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&self.iv_prefix);
        iv[12..].copy_from_slice(&seq.to_be_bytes());
        iv
    }

    #[cfg(test)]
    pub(crate) fn key(&self) -> &[u8; 16] {
        &self.key
    }

    #[cfg(test)]
    pub(crate) fn iv_prefix(&self) -> &[u8; 12] {
        &self.iv_prefix
    }

    #[cfg(test)]
    pub(crate) fn sig_key(&self) -> &[u8; 28] {
        &self.sig_key
    }
}

impl fmt::Debug for KlapEncryptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KlapEncryptionSession")
            .field("seq", &self.seq)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
