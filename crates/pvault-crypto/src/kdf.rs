//! Key derivation: passphrase + salt → wrapping key
//!
//! PBKDF2-HMAC-SHA256 at 100 000 iterations is the default and matches
//! envelopes that carry no `kdf` field. Argon2id is available as a stronger
//! option; whichever was used is recorded in the envelope.

use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::EncryptionKey;
use crate::{KEY_SIZE, SALT_SIZE};

/// Baseline PBKDF2 iteration count.
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 100_000;

/// Upper bounds accepted when decoding someone else's envelope.
const PBKDF2_MAX_ITERATIONS: u32 = 10_000_000;
const ARGON2_MAX_MEM_KIB: u32 = 4 * 1024 * 1024;
const ARGON2_MAX_TIME_COST: u32 = 64;
const ARGON2_MAX_PARALLELISM: u32 = 64;

/// Minimum Argon2id cost accepted for new envelopes (OWASP baseline).
const ARGON2_MIN_MEM_KIB: u32 = 19 * 1024;
const ARGON2_MIN_TIME_COST: u32 = 2;

/// KDF selection and cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KdfParams {
    #[serde(rename = "pbkdf2-sha256")]
    Pbkdf2Sha256 { iterations: u32 },
    #[serde(rename_all = "camelCase")]
    Argon2id {
        /// Memory cost in KiB
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::Pbkdf2Sha256 {
            iterations: PBKDF2_DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Reject parameters weaker than the PBKDF2-100k baseline.
    ///
    /// Applied to parameters used for new envelopes; decoding only applies
    /// [`KdfParams::check_bounds`].
    pub fn check_strength(&self) -> CryptoResult<()> {
        self.check_bounds()?;
        match *self {
            Self::Pbkdf2Sha256 { iterations } if iterations < PBKDF2_DEFAULT_ITERATIONS => {
                Err(CryptoError::malformed(format!(
                    "pbkdf2 iterations must be at least {PBKDF2_DEFAULT_ITERATIONS}, got {iterations}"
                )))
            }
            Self::Argon2id {
                mem_cost_kib,
                time_cost,
                ..
            } if mem_cost_kib < ARGON2_MIN_MEM_KIB || time_cost < ARGON2_MIN_TIME_COST => {
                Err(CryptoError::malformed(format!(
                    "argon2id cost below minimum (mem >= {ARGON2_MIN_MEM_KIB} KiB, t >= {ARGON2_MIN_TIME_COST})"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Sanity limits so a crafted envelope cannot make decryption spin or
    /// allocate without bound.
    pub fn check_bounds(&self) -> CryptoResult<()> {
        match *self {
            Self::Pbkdf2Sha256 { iterations } => {
                if iterations == 0 || iterations > PBKDF2_MAX_ITERATIONS {
                    return Err(CryptoError::malformed(format!(
                        "pbkdf2 iterations out of range: {iterations}"
                    )));
                }
            }
            Self::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => {
                if mem_cost_kib > ARGON2_MAX_MEM_KIB
                    || time_cost == 0
                    || time_cost > ARGON2_MAX_TIME_COST
                    || parallelism == 0
                    || parallelism > ARGON2_MAX_PARALLELISM
                {
                    return Err(CryptoError::malformed("argon2id parameters out of range"));
                }
            }
        }
        Ok(())
    }
}

/// Derive a 256-bit wrapping key from a passphrase and a 16-byte salt.
///
/// Deterministic: the same `(passphrase, salt, params)` always yields the
/// same key, which is what lets decryption re-derive it.
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> CryptoResult<EncryptionKey> {
    let secret = passphrase.expose_secret();
    if secret.is_empty() {
        return Err(CryptoError::InvalidPassphrase);
    }
    params.check_bounds()?;

    let mut key = EncryptionKey::zeroed();
    match *params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, key.as_bytes_mut());
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => {
            let argon2_params = Params::new(mem_cost_kib, time_cost, parallelism, Some(KEY_SIZE))
                .map_err(|e| CryptoError::malformed(format!("invalid Argon2id params: {e}")))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
                .hash_password_into(secret.as_bytes(), salt, key.as_bytes_mut())
                .map_err(|e| {
                    tracing::error!(error = %e, "Argon2id KDF failed");
                    CryptoError::EncryptionFailed
                })?;
        }
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_pbkdf2() -> KdfParams {
        KdfParams::Pbkdf2Sha256 { iterations: 1_000 }
    }

    #[test]
    fn test_kdf_deterministic() {
        let passphrase = SecretString::from("test-passphrase-123");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(&passphrase, &salt, &fast_pbkdf2()).unwrap();
        let key2 = derive_key(&passphrase, &salt, &fast_pbkdf2()).unwrap();

        assert_eq!(
            key1.as_bytes(),
            key2.as_bytes(),
            "KDF must be deterministic"
        );
    }

    #[test]
    fn test_kdf_different_passphrases() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key(&SecretString::from("passphrase-a"), &salt, &fast_pbkdf2()).unwrap();
        let key2 = derive_key(&SecretString::from("passphrase-b"), &salt, &fast_pbkdf2()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let passphrase = SecretString::from("same-passphrase");

        let key1 = derive_key(&passphrase, &[1u8; SALT_SIZE], &fast_pbkdf2()).unwrap();
        let key2 = derive_key(&passphrase, &[2u8; SALT_SIZE], &fast_pbkdf2()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_empty_passphrase_rejected() {
        let result = derive_key(&SecretString::from(""), &[0u8; SALT_SIZE], &fast_pbkdf2());
        assert_eq!(result.unwrap_err(), CryptoError::InvalidPassphrase);
    }

    #[test]
    fn test_pbkdf2_matches_reference() {
        let mut expected = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(b"password", b"saltsaltsaltsalt", 1, &mut expected);

        let key = derive_key(
            &SecretString::from("password"),
            b"saltsaltsaltsalt",
            &KdfParams::Pbkdf2Sha256 { iterations: 1 },
        )
        .unwrap();
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_argon2id_deterministic_and_distinct_from_pbkdf2() {
        let passphrase = SecretString::from("correct-horse");
        let salt = [3u8; SALT_SIZE];
        let argon = KdfParams::Argon2id {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        };

        let a1 = derive_key(&passphrase, &salt, &argon).unwrap();
        let a2 = derive_key(&passphrase, &salt, &argon).unwrap();
        let p = derive_key(&passphrase, &salt, &fast_pbkdf2()).unwrap();

        assert_eq!(a1.as_bytes(), a2.as_bytes());
        assert_ne!(a1.as_bytes(), p.as_bytes());
    }

    #[test]
    fn test_default_is_pbkdf2_100k() {
        assert_eq!(
            KdfParams::default(),
            KdfParams::Pbkdf2Sha256 { iterations: 100_000 }
        );
        assert!(KdfParams::default().check_strength().is_ok());
    }

    #[test]
    fn test_strength_rejects_weak_params() {
        assert!(fast_pbkdf2().check_strength().is_err());
        assert!(fast_pbkdf2().check_bounds().is_ok());

        let weak_argon = KdfParams::Argon2id {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        };
        assert!(weak_argon.check_strength().is_err());
    }

    #[test]
    fn test_bounds_reject_zero_and_huge() {
        assert!(KdfParams::Pbkdf2Sha256 { iterations: 0 }.check_bounds().is_err());
        assert!(KdfParams::Pbkdf2Sha256 { iterations: u32::MAX }.check_bounds().is_err());
        let huge = KdfParams::Argon2id {
            mem_cost_kib: u32::MAX,
            time_cost: 3,
            parallelism: 4,
        };
        assert!(huge.check_bounds().is_err());
    }

    #[test]
    fn test_kdf_params_json_shape() {
        let json = serde_json::to_value(KdfParams::default()).unwrap();
        assert_eq!(json["algorithm"], "pbkdf2-sha256");
        assert_eq!(json["iterations"], 100_000);

        let argon: KdfParams = serde_json::from_str(
            r#"{"algorithm":"argon2id","memCostKib":65536,"timeCost":3,"parallelism":4}"#,
        )
        .unwrap();
        assert_eq!(
            argon,
            KdfParams::Argon2id {
                mem_cost_kib: 65536,
                time_cost: 3,
                parallelism: 4
            }
        );
    }
}
