//! Per-file keys: generation, raw export, and wrapping under a passphrase key

use zeroize::{Zeroize, Zeroizing};

use crate::aead;
use crate::entropy::{random_array, EntropySource};
use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Length of a wrapped key: the 32 key bytes plus the GCM tag.
pub const WRAPPED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;

/// A 256-bit AES-GCM key. Zeroized on drop.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// All-zero key, filled in place by a KDF or the random source so no
    /// unzeroized copy of the key bytes is left on the stack.
    pub(crate) fn zeroed() -> Self {
        Self {
            bytes: [0u8; KEY_SIZE],
        }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8; KEY_SIZE] {
        &mut self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random file key.
pub fn generate_key(entropy: &dyn EntropySource) -> CryptoResult<EncryptionKey> {
    let mut key = EncryptionKey::zeroed();
    entropy.fill(key.as_bytes_mut())?;
    Ok(key)
}

/// Encrypt the raw bytes of `file_key` under `wrapping_key`.
///
/// Output: `[32-byte encrypted key][16-byte tag]`. The nonce is returned
/// to the caller, who stores it next to the wrapped bytes.
pub fn wrap_key(
    wrapping_key: &EncryptionKey,
    file_key: &EncryptionKey,
    entropy: &dyn EntropySource,
) -> CryptoResult<(Vec<u8>, [u8; NONCE_SIZE])> {
    let nonce = random_array::<NONCE_SIZE>(entropy)?;
    let wrapped = aead::seal(wrapping_key, &nonce, file_key.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok((wrapped, nonce))
}

/// Recover a file key wrapped by [`wrap_key`].
///
/// Any failure here means the wrapping key was wrong (or the wrapped bytes
/// were altered, which cannot be told apart) and is reported as
/// `WrongPassphrase`.
pub fn unwrap_key(
    wrapping_key: &EncryptionKey,
    wrapped: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> CryptoResult<EncryptionKey> {
    let plaintext = Zeroizing::new(
        aead::open(wrapping_key, nonce, wrapped).map_err(|_| CryptoError::WrongPassphrase)?,
    );

    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::WrongPassphrase);
    }

    let mut key = EncryptionKey::zeroed();
    key.as_bytes_mut().copy_from_slice(&plaintext);
    Ok(key)
}
