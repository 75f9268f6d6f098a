//! pvault-crypto: client-side envelope encryption for photo backups
//!
//! Each file gets its own AES-256-GCM key. The key either travels in the
//! envelope as-is, or wrapped under a key derived from a passphrase.
//!
//! ```text
//! file key (256-bit random, per file)
//!   └── file AEAD: AES-256-GCM (key=file_key, nonce=random 96-bit)
//! passphrase (optional)
//!   └── wrapping key = PBKDF2-HMAC-SHA256(passphrase, salt=random 128-bit, 100k)
//!         └── key wrap AEAD: AES-256-GCM (key=wrapping, nonce=random 96-bit)
//! ```

pub(crate) mod aead;
pub mod batch;
pub mod entropy;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod sidecar;

pub use batch::{encrypt_batch, BatchItem, BatchMode, BatchOutcome};
pub use entropy::{EntropySource, OsEntropy};
pub use envelope::{decrypt_file, encrypt_file, Encryptor, Envelope, KeyMaterial};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, KdfParams, PBKDF2_DEFAULT_ITERATIONS};
pub use keys::{generate_key, unwrap_key, wrap_key, EncryptionKey};
pub use sidecar::Sidecar;

/// Size of a file or wrapping key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a key-derivation salt
pub const SALT_SIZE: usize = 16;
