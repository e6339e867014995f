//! Cryptographic primitives for Tapo device communication.
//!
//! - [`hash`]: SHA-1/SHA-256 helpers and random seed generation
//! - [`cbc`]: AES-128-CBC with the padding schemes used on the wire
//! - [`klap`]: KLAP key derivation and the sequence-bound session cipher
//! - [`passthrough`]: RSA key exchange and the static-key securePassthrough cipher

pub mod cbc;
pub mod hash;
pub mod klap;
pub mod passthrough;

pub use klap::KlapEncryptionSession;
pub use passthrough::{PassthroughCipher, RsaKeyPair};

use thiserror::Error;

/// Error type for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Ciphertext is not a whole number of AES blocks.
    #[error("ciphertext length {0} is not a multiple of the block size")]
    InvalidBlockLength(usize),

    /// Payload shorter than its fixed-size prefix.
    #[error("payload too short: {actual} bytes, expected at least {expected}")]
    TooShort {
        /// Minimum length.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// Key material of the wrong size.
    #[error("invalid key material: expected {expected} bytes, got {actual}")]
    InvalidKeyMaterial {
        /// Expected length.
        expected: usize,
        /// Length received.
        actual: usize,
    },

    /// Base64 payload could not be decoded.
    #[error("base64 decode failed: {0}")]
    Base64(String),

    /// RSA key generation, export or decryption failed.
    #[error("RSA operation failed: {0}")]
    Rsa(String),
}
