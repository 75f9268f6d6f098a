//! Secure random source used for keys, nonces and salts.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// A source of cryptographically secure random bytes.
///
/// Shared across threads by the batch encryptor, so implementations must be
/// safe for concurrent use.
pub trait EntropySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> CryptoResult<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
        OsRng.try_fill_bytes(dest).map_err(|e| {
            tracing::error!(error = %e, "OS random source failed");
            CryptoError::EntropyUnavailable
        })
    }
}

/// Fill a fixed-size array from `source`.
pub(crate) fn random_array<const N: usize>(source: &dyn EntropySource) -> CryptoResult<[u8; N]> {
    let mut out = [0u8; N];
    source.fill(&mut out)?;
    Ok(out)
}
