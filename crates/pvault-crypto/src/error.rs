use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Failures of the envelope encryptor.
///
/// Messages are safe to show to a user: none of them carry cipher
/// internals, and AEAD errors are mapped rather than wrapped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("secure random source unavailable")]
    EntropyUnavailable,

    #[error("passphrase must not be empty")]
    InvalidPassphrase,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("incorrect passphrase")]
    WrongPassphrase,

    #[error("file could not be decrypted: data is corrupt or was modified")]
    CorruptEnvelope,

    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl CryptoError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}
