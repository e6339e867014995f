//! securePassthrough cipher and the RSA key exchange that seeds it.
//!
//! The client sends an RSA public key in the unencrypted `handshake` request.
//! The device answers with 32 bytes encrypted to that key (PKCS#1 v1.5):
//! 16 bytes of AES key followed by 16 bytes of IV. Both stay fixed for the
//! life of the session, and every inner command is PKCS#7-padded, encrypted
//! and base64-encoded into the `securePassthrough` envelope.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
    pkcs8::{EncodePublicKey, LineEnding},
    rand_core::OsRng,
};

use super::{
    CryptoError,
    cbc::{self, Padding},
};

/// Modulus size used for the handshake key.
pub const RSA_KEY_BITS: usize = 1024;

/// Length of the decrypted key exchange blob (key || iv).
pub const KEY_MATERIAL_LEN: usize = 32;

/// Static AES-128-CBC cipher for one securePassthrough session.
#[derive(Clone, PartialEq, Eq)]
pub struct PassthroughCipher {
    key: [u8; 16],
    iv: [u8; 16],
}

impl PassthroughCipher {
    /// Creates a cipher from an explicit key and IV.
    pub fn new(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Splits decrypted key exchange output into key and IV.
    pub fn from_key_material(material: &[u8]) -> Result<Self, CryptoError> {
        if material.len() != KEY_MATERIAL_LEN {
            return Err(CryptoError::InvalidKeyMaterial {
                expected: KEY_MATERIAL_LEN,
                actual: material.len(),
            });
        }
        let mut key = [0u8; 16];
        let mut iv = [0u8; 16];
        key.copy_from_slice(&material[..16]);
        iv.copy_from_slice(&material[16..]);
        Ok(Self { key, iv })
    }

    /// Encrypts an inner command and returns it base64-encoded.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        STANDARD.encode(cbc::encrypt(&self.key, &self.iv, plaintext, Padding::Pkcs7))
    }

    /// Decodes and decrypts a base64 `response` field.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let ciphertext = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Base64(e.to_string()))?;
        cbc::decrypt(&self.key, &self.iv, &ciphertext, Padding::Pkcs7)
    }
}

impl fmt::Debug for PassthroughCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// RSA key pair offered to the device during the legacy handshake.
#[derive(Clone)]
pub struct RsaKeyPair {
    private_key: RsaPrivateKey,
    public_pem: String,
}

impl RsaKeyPair {
    /// Generates a fresh key pair. This is CPU-bound and slow; async callers
    /// run it on a blocking thread.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        // rsa's own OsRng keeps rand_core versions apart from rand 0.9
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CryptoError::Rsa(format!("key generation failed: {}", e)))?;
        Self::from_private_key(private_key)
    }

    /// Wraps an existing private key.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, CryptoError> {
        let public_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Rsa(format!("PEM encoding failed: {}", e)))?;
        Ok(Self {
            private_key,
            public_pem,
        })
    }

    /// SPKI PEM of the public half, as sent in the `handshake` params.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// PKCS#1 v1.5 decryption of the device's key blob.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| CryptoError::Rsa(format!("decryption failed: {}", e)))
    }

    /// Decodes the base64 `key` field of the handshake reply and derives the
    /// session cipher from it.
    pub fn open_key_exchange(&self, encoded: &str) -> Result<PassthroughCipher, CryptoError> {
        let blob = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::Base64(e.to_string()))?;
        PassthroughCipher::from_key_material(&self.decrypt(&blob)?)
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
