//! AES-128-CBC as used by both protocol generations.
//!
//! The cipher itself never pads: callers pick a [`Padding`] and the plaintext
//! is padded before encryption. KLAP requests are padded with ASCII spaces,
//! which the device's JSON parser skips as trailing whitespace; passthrough
//! payloads use PKCS#7.
//!
//! Decryption takes the same [`Padding`]: with [`Padding::Spaces`] the block
//! plaintext comes back whole, with [`Padding::Pkcs7`] a well-formed PKCS#7
//! tail is removed and anything else is left untouched.

use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};

use super::CryptoError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Plaintext padding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Pad with `b' '` up to the next block boundary (nothing if aligned).
    Spaces,
    /// Standard PKCS#7 (always adds 1..=16 bytes).
    Pkcs7,
}

impl Padding {
    /// Returns `plaintext` padded to a multiple of [`BLOCK_SIZE`].
    pub fn apply(self, plaintext: &[u8]) -> Vec<u8> {
        let mut padded = plaintext.to_vec();
        match self {
            Padding::Spaces => {
                let rem = plaintext.len() % BLOCK_SIZE;
                if rem != 0 {
                    padded.resize(plaintext.len() + BLOCK_SIZE - rem, b' ');
                }
            }
            Padding::Pkcs7 => {
                let pad = BLOCK_SIZE - plaintext.len() % BLOCK_SIZE;
                padded.resize(plaintext.len() + pad, pad as u8);
            }
        }
        padded
    }
}

/// Encrypts `plaintext` after applying `padding`.
pub fn encrypt(key: &[u8; 16], iv: &[u8; 16], plaintext: &[u8], padding: Padding) -> Vec<u8> {
    let padded = padding.apply(plaintext);
    Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(&padded)
}

/// Decrypts `ciphertext` and removes `padding`.
///
/// Space padding cannot be told apart from plaintext, so it is kept.
pub fn decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    ciphertext: &[u8],
    padding: Padding,
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidBlockLength(ciphertext.len()));
    }

    let mut plaintext = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CryptoError::InvalidBlockLength(ciphertext.len()))?;

    if padding == Padding::Pkcs7 {
        let unpadded = pkcs7_len(&plaintext);
        plaintext.truncate(unpadded);
    }
    Ok(plaintext)
}

/// Length of `data` without its PKCS#7 tail, or the full length if the tail
/// is not valid PKCS#7.
fn pkcs7_len(data: &[u8]) -> usize {
    let Some(&last) = data.last() else {
        return 0;
    };
    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return data.len();
    }
    if data[data.len() - pad..].iter().all(|&b| b == last) {
        data.len() - pad
    } else {
        data.len()
    }
}
