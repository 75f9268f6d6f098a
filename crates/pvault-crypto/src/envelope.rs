//! Envelope construction and its inverse.
//!
//! ```text
//! encrypt_file(P, passphrase?)
//!   file_key  = random 256-bit
//!   file_nonce = random 96-bit
//!   ciphertext = AES-256-GCM(file_key, file_nonce, P)          -- ciphertext || tag
//!   no passphrase:  key_material = file_key                     (raw)
//!   passphrase:     salt = random 128-bit, key_nonce = random 96-bit
//!                   wrapping = KDF(passphrase, salt)
//!                   key_material = AES-256-GCM(wrapping, key_nonce, file_key)
//! ```
//!
//! An unprotected envelope carries its own key, so anyone holding the
//! envelope can read the file. Callers that need confidentiality against the
//! storage side must pass a passphrase.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use zeroize::Zeroizing;

use crate::aead;
use crate::entropy::{random_array, EntropySource, OsEntropy};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{generate_key, unwrap_key, wrap_key, EncryptionKey};
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};

/// How the file key is stored inside an envelope.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// The exported file key itself.
    Raw(Zeroizing<[u8; KEY_SIZE]>),
    /// The file key wrapped under a passphrase-derived key.
    Protected {
        wrapped: Vec<u8>,
        nonce: [u8; NONCE_SIZE],
        salt: [u8; SALT_SIZE],
        kdf: KdfParams,
    },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw(_) => f.debug_tuple("Raw").field(&"[REDACTED]").finish(),
            Self::Protected {
                wrapped,
                nonce,
                salt,
                kdf,
            } => f
                .debug_struct("Protected")
                .field("wrapped_len", &wrapped.len())
                .field("nonce", nonce)
                .field("salt", salt)
                .field("kdf", kdf)
                .finish(),
        }
    }
}

/// An encrypted file plus everything needed to decrypt it given the right
/// secret. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    ciphertext: Vec<u8>,
    file_nonce: [u8; NONCE_SIZE],
    key: KeyMaterial,
}

impl Envelope {
    pub(crate) fn new(ciphertext: Vec<u8>, file_nonce: [u8; NONCE_SIZE], key: KeyMaterial) -> Self {
        Self {
            ciphertext,
            file_nonce,
            key,
        }
    }

    /// AEAD output: encrypted bytes followed by the 16-byte tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn into_ciphertext(self) -> Vec<u8> {
        self.ciphertext
    }

    pub fn file_nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.file_nonce
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Raw key bytes when unprotected, wrapped key bytes when protected.
    pub fn key_material(&self) -> &[u8] {
        match &self.key {
            KeyMaterial::Raw(raw) => raw.as_slice(),
            KeyMaterial::Protected { wrapped, .. } => wrapped,
        }
    }

    pub fn is_key_protected(&self) -> bool {
        matches!(self.key, KeyMaterial::Protected { .. })
    }

    pub fn key_nonce(&self) -> Option<&[u8; NONCE_SIZE]> {
        match &self.key {
            KeyMaterial::Protected { nonce, .. } => Some(nonce),
            KeyMaterial::Raw(_) => None,
        }
    }

    pub fn key_salt(&self) -> Option<&[u8; SALT_SIZE]> {
        match &self.key {
            KeyMaterial::Protected { salt, .. } => Some(salt),
            KeyMaterial::Raw(_) => None,
        }
    }

    pub fn kdf(&self) -> Option<&KdfParams> {
        match &self.key {
            KeyMaterial::Protected { kdf, .. } => Some(kdf),
            KeyMaterial::Raw(_) => None,
        }
    }
}

/// The envelope encryptor: KDF choice plus a random source.
///
/// Holds no per-file state; every call generates its own key, nonces and
/// salt, so one instance can be shared across threads.
#[derive(Clone)]
pub struct Encryptor {
    kdf: KdfParams,
    entropy: Arc<dyn EntropySource>,
}

impl Default for Encryptor {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryptor").field("kdf", &self.kdf).finish()
    }
}

impl Encryptor {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            kdf,
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Replace the random source (tests use this to inject failures).
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn generate_key(&self) -> CryptoResult<EncryptionKey> {
        generate_key(self.entropy.as_ref())
    }

    /// Encrypt `plaintext`, wrapping the file key when a passphrase is given.
    ///
    /// Either returns a complete envelope or an error; nothing partial
    /// escapes, and key material from a failed call is dropped (zeroized).
    pub fn encrypt_file(
        &self,
        plaintext: &[u8],
        passphrase: Option<&SecretString>,
    ) -> CryptoResult<Envelope> {
        if passphrase.is_some_and(|p| p.expose_secret().is_empty()) {
            return Err(CryptoError::InvalidPassphrase);
        }

        let entropy = self.entropy.as_ref();
        let file_key = generate_key(entropy)?;
        let file_nonce = random_array::<NONCE_SIZE>(entropy)?;

        let ciphertext = aead::seal(&file_key, &file_nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let key = match passphrase {
            None => KeyMaterial::Raw(Zeroizing::new(*file_key.as_bytes())),
            Some(passphrase) => {
                let salt = random_array::<SALT_SIZE>(entropy)?;
                let wrapping = derive_key(passphrase, &salt, &self.kdf)?;
                let (wrapped, nonce) = wrap_key(&wrapping, &file_key, entropy)?;
                KeyMaterial::Protected {
                    wrapped,
                    nonce,
                    salt,
                    kdf: self.kdf,
                }
            }
        };

        debug!(
            plaintext_bytes = plaintext.len(),
            ciphertext_bytes = ciphertext.len(),
            protected = passphrase.is_some(),
            "encrypted file envelope"
        );

        Ok(Envelope::new(ciphertext, file_nonce, key))
    }

    pub fn decrypt_file(
        &self,
        envelope: &Envelope,
        passphrase: Option<&SecretString>,
    ) -> CryptoResult<Vec<u8>> {
        decrypt_file(envelope, passphrase)
    }
}

/// Encrypt with the default KDF and the OS random source.
pub fn encrypt_file(plaintext: &[u8], passphrase: Option<&SecretString>) -> CryptoResult<Envelope> {
    Encryptor::default().encrypt_file(plaintext, passphrase)
}

/// Recover the plaintext of `envelope`.
///
/// - protected: `passphrase` is required; a wrong one fails `WrongPassphrase`
/// - unprotected: the stored key is used and any passphrase is ignored
/// - tampered or truncated ciphertext fails `CorruptEnvelope`
pub fn decrypt_file(envelope: &Envelope, passphrase: Option<&SecretString>) -> CryptoResult<Vec<u8>> {
    let file_key = match envelope.key() {
        KeyMaterial::Raw(raw) => {
            if passphrase.is_some() {
                debug!("passphrase supplied for an unprotected envelope; ignoring");
            }
            EncryptionKey::from_bytes(**raw)
        }
        KeyMaterial::Protected {
            wrapped,
            nonce,
            salt,
            kdf,
        } => {
            let passphrase = passphrase.ok_or(CryptoError::InvalidPassphrase)?;
            let wrapping = derive_key(passphrase, salt, kdf)?;
            unwrap_key(&wrapping, wrapped, nonce)?
        }
    };

    let plaintext = aead::open(&file_key, envelope.file_nonce(), envelope.ciphertext())
        .map_err(|_| CryptoError::CorruptEnvelope)?;

    debug!(plaintext_bytes = plaintext.len(), "decrypted file envelope");
    Ok(plaintext)
}
