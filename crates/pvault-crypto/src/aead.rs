//! AES-256-GCM with a 96-bit nonce and 128-bit tag.
//!
//! Output layout is the `aes-gcm` crate convention: `ciphertext || tag`.
//! The nonce is never prepended here; envelopes store it separately.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::keys::EncryptionKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Opaque AEAD failure. Callers map it to the error kind that fits the
/// step that failed, so no detail is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AeadFailure;

pub(crate) fn seal(
    key: &EncryptionKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, AeadFailure> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| AeadFailure)
}

pub(crate) fn open(
    key: &EncryptionKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AeadFailure> {
    if ciphertext.len() < TAG_SIZE {
        return Err(AeadFailure);
    }
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AeadFailure)
}
