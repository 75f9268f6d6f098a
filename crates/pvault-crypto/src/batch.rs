//! Multi-file encryption with per-file outcomes.
//!
//! Each item gets its own key, nonces and salt. A failure is recorded
//! against its item only; the other items still finish.

use rayon::prelude::*;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::envelope::{Encryptor, Envelope};
use crate::error::CryptoResult;

/// How a batch is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// One item at a time, in input order.
    Sequential,
    /// Items spread over the rayon thread pool.
    #[default]
    Parallel,
}

/// A file queued for encryption.
pub struct BatchItem<'a> {
    pub name: String,
    pub plaintext: &'a [u8],
    pub passphrase: Option<&'a SecretString>,
}

/// Result for one item, in the same position as its input.
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: CryptoResult<Envelope>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Encrypt every item. The output has one entry per input, in input order.
///
/// `progress` is called after each item with `(done, total, name)`; under
/// `Parallel` the calls arrive from worker threads in completion order.
pub fn encrypt_batch(
    encryptor: &Encryptor,
    items: &[BatchItem<'_>],
    mode: BatchMode,
    progress: Option<&(dyn Fn(u64, u64, &str) + Send + Sync)>,
) -> Vec<BatchOutcome> {
    let total = items.len() as u64;
    let done = std::sync::atomic::AtomicU64::new(0);

    let run = |item: &BatchItem<'_>| {
        let result = encryptor.encrypt_file(item.plaintext, item.passphrase);
        match &result {
            Ok(_) => debug!(name = %item.name, "batch item encrypted"),
            Err(e) => warn!(name = %item.name, error = %e, "batch item failed"),
        }
        let n = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if let Some(cb) = progress {
            cb(n, total, &item.name);
        }
        BatchOutcome {
            name: item.name.clone(),
            result,
        }
    };

    match mode {
        BatchMode::Sequential => items.iter().map(run).collect(),
        BatchMode::Parallel => items.par_iter().map(run).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropySource, OsEntropy};
    use crate::error::CryptoError;
    use crate::kdf::KdfParams;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast() -> Encryptor {
        Encryptor::new(KdfParams::Pbkdf2Sha256 { iterations: 1_000 })
    }

    fn item<'a>(name: &str, data: &'a [u8], pass: Option<&'a SecretString>) -> BatchItem<'a> {
        BatchItem {
            name: name.to_string(),
            plaintext: data,
            passphrase: pass,
        }
    }

    /// Fails the draws that belong to the second file of an unprotected
    /// sequential batch (key + nonce = two draws per file).
    struct FailSecondFile(AtomicUsize);

    impl EntropySource for FailSecondFile {
        fn fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
            let call = self.0.fetch_add(1, Ordering::SeqCst);
            if call == 2 || call == 3 {
                return Err(CryptoError::EntropyUnavailable);
            }
            OsEntropy.fill(dest)
        }
    }

    #[test]
    fn test_entropy_failure_isolated_to_one_file() {
        let enc = fast().with_entropy(Arc::new(FailSecondFile(AtomicUsize::new(0))));
        let items = [
            item("one.jpg", b"first", None),
            item("two.jpg", b"second", None),
            item("three.jpg", b"third", None),
        ];

        let outcomes = encrypt_batch(&enc, &items, BatchMode::Sequential, None);

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_ok());
        assert_eq!(
            outcomes[1].result.as_ref().unwrap_err(),
            &CryptoError::EntropyUnavailable
        );
        assert!(outcomes[2].is_ok());

        for (outcome, expected) in [(&outcomes[0], &b"first"[..]), (&outcomes[2], &b"third"[..])] {
            let envelope = outcome.result.as_ref().unwrap();
            assert_eq!(enc.decrypt_file(envelope, None).unwrap(), expected);
        }
    }

    #[test]
    fn test_parallel_keeps_order_and_isolates_failure() {
        let enc = fast();
        let good = SecretString::from("pw");
        let empty = SecretString::from("");
        let items = [
            item("a", b"aaa", Some(&good)),
            item("b", b"bbb", Some(&empty)),
            item("c", b"ccc", None),
        ];

        let outcomes = encrypt_batch(&enc, &items, BatchMode::Parallel, None);

        let names: Vec<_> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(
            enc.decrypt_file(outcomes[0].result.as_ref().unwrap(), Some(&good))
                .unwrap(),
            b"aaa"
        );
        assert_eq!(
            outcomes[1].result.as_ref().unwrap_err(),
            &CryptoError::InvalidPassphrase
        );
        assert!(outcomes[2].is_ok());
    }

    #[test]
    fn test_progress_reports_every_item() {
        let seen = Mutex::new(Vec::new());
        let cb: &(dyn Fn(u64, u64, &str) + Send + Sync) = &|done, total, _name| {
            seen.lock().unwrap().push((done, total));
        };
        let items = [item("x", b"1", None), item("y", b"2", None)];

        encrypt_batch(&fast(), &items, BatchMode::Sequential, Some(cb));

        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(encrypt_batch(&fast(), &[], BatchMode::Parallel, None).is_empty());
    }
}
