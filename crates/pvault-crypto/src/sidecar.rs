//! JSON sidecar that travels next to the ciphertext blob
//!
//! ```json
//! {
//!   "version": 1,
//!   "isKeyProtected": true,
//!   "fileNonce": "<base64, 12 bytes>",
//!   "keyMaterial": "<base64, 32 raw or 48 wrapped bytes>",
//!   "keyNonce": "<base64, 12 bytes>",     // protected only
//!   "keySalt": "<base64, 16 bytes>",      // protected only
//!   "kdf": { "algorithm": "pbkdf2-sha256", "iterations": 100000 }
//! }
//! ```
//!
//! A missing `kdf` on a protected sidecar means PBKDF2-SHA256 at 100 000
//! iterations.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::envelope::{Envelope, KeyMaterial};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::KdfParams;
use crate::keys::WRAPPED_KEY_SIZE;
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};

/// Current sidecar format version.
pub const SIDECAR_VERSION: u32 = 1;

fn default_version() -> u32 {
    SIDECAR_VERSION
}

/// Envelope header in its transport form. Everything but the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    #[serde(default = "default_version")]
    pub version: u32,
    pub is_key_protected: bool,
    pub file_nonce: String,
    pub key_material: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

impl Sidecar {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CryptoError::malformed(format!("sidecar serialization: {e}")))
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| CryptoError::malformed(format!("sidecar deserialization: {e}")))
    }
}

impl Envelope {
    /// The transport header for this envelope.
    pub fn sidecar(&self) -> Sidecar {
        let (key_nonce, key_salt, kdf) = match self.key() {
            KeyMaterial::Raw(_) => (None, None, None),
            KeyMaterial::Protected {
                nonce, salt, kdf, ..
            } => (
                Some(base64_encode(nonce)),
                Some(base64_encode(salt)),
                Some(*kdf),
            ),
        };

        Sidecar {
            version: SIDECAR_VERSION,
            is_key_protected: self.is_key_protected(),
            file_nonce: base64_encode(self.file_nonce()),
            key_material: base64_encode(self.key_material()),
            key_nonce,
            key_salt,
            kdf,
        }
    }

    /// Reassemble an envelope from a downloaded blob and its sidecar.
    ///
    /// Rejects sidecars whose protection flag disagrees with the presence
    /// of `keyNonce`/`keySalt`, and fields of the wrong length.
    pub fn from_parts(ciphertext: Vec<u8>, sidecar: &Sidecar) -> CryptoResult<Self> {
        if sidecar.version != SIDECAR_VERSION {
            return Err(CryptoError::malformed(format!(
                "unsupported sidecar version {}",
                sidecar.version
            )));
        }

        let file_nonce: [u8; NONCE_SIZE] = decode_fixed(&sidecar.file_nonce, "fileNonce")?;
        let material = Zeroizing::new(base64_decode(&sidecar.key_material, "keyMaterial")?);

        let key = match (
            sidecar.is_key_protected,
            sidecar.key_nonce.as_deref(),
            sidecar.key_salt.as_deref(),
        ) {
            (false, None, None) => {
                if sidecar.kdf.is_some() {
                    return Err(CryptoError::malformed("kdf present on unprotected envelope"));
                }
                if material.len() != KEY_SIZE {
                    return Err(CryptoError::malformed(format!(
                        "keyMaterial must be {KEY_SIZE} bytes, got {}",
                        material.len()
                    )));
                }
                let mut raw = Zeroizing::new([0u8; KEY_SIZE]);
                raw.copy_from_slice(&material);
                KeyMaterial::Raw(raw)
            }
            (true, Some(nonce), Some(salt)) => {
                if material.len() != WRAPPED_KEY_SIZE {
                    return Err(CryptoError::malformed(format!(
                        "wrapped keyMaterial must be {WRAPPED_KEY_SIZE} bytes, got {}",
                        material.len()
                    )));
                }
                let kdf = sidecar.kdf.unwrap_or_default();
                kdf.check_bounds()?;
                KeyMaterial::Protected {
                    wrapped: material.to_vec(),
                    nonce: decode_fixed(nonce, "keyNonce")?,
                    salt: decode_fixed(salt, "keySalt")?,
                    kdf,
                }
            }
            (true, _, _) => {
                return Err(CryptoError::malformed(
                    "protected envelope requires both keyNonce and keySalt",
                ))
            }
            (false, _, _) => {
                return Err(CryptoError::malformed(
                    "unprotected envelope must not carry keyNonce or keySalt",
                ))
            }
        };

        Ok(Envelope::new(ciphertext, file_nonce, key))
    }
}

fn decode_fixed<const N: usize>(s: &str, field: &str) -> CryptoResult<[u8; N]> {
    let bytes = base64_decode(s, field)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::malformed(format!("{field} must be {N} bytes, got {}", bytes.len()))
    })
}

fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn base64_decode(s: &str, field: &str) -> CryptoResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| CryptoError::malformed(format!("{field}: base64 decode: {e}")))
}
