//! Hash helpers and seed generation.

use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Length of a handshake seed in bytes.
pub const SEED_LEN: usize = 16;

/// SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 digest over the concatenation of `parts`.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Fresh random handshake seed.
pub fn random_seed() -> [u8; SEED_LEN] {
    let mut seed = [0u8; SEED_LEN];
    rand::rng().fill_bytes(&mut seed);
    seed
}
