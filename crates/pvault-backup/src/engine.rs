//! Backup engine: local file → envelope → store, and back.
//!
//!   - `backup_file`: read → encrypt on the blocking pool → upload blob + record
//!   - `restore_file`: download → decrypt on the blocking pool → atomic local write
//!   - `backup_batch`: many files, bounded concurrency, one outcome per file
//!
//! Key derivation is deliberately slow, so encryption and decryption never run
//! on the async executor threads. Key material exists only inside the blocking
//! task and is zeroized when that task finishes or is abandoned.

use anyhow::{Context, Result};
use pvault_core::types::PhotoMetadata;
use pvault_core::PvaultError;
use pvault_crypto::{CryptoError, Encryptor};
use pvault_storage::{BackupStore, StorageError, UploadRequest};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Progress callback type (files_done, files_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Result of backing up a single file
#[derive(Debug, Clone)]
pub struct BackupResult {
    pub path: PathBuf,
    /// Id of the stored file
    pub id: String,
    pub bytes: u64,
    pub encrypted_bytes: u64,
    pub protected: bool,
}

/// Result of restoring a single file
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub id: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// Per-file result of a batch backup
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: std::result::Result<BackupResult, PvaultError>,
}

/// Encrypt one local file and upload it.
///
/// The modification time is recorded as `takenAt`. Every call generates a
/// fresh key, nonces and salt, so retrying after a failure is safe.
pub async fn backup_file(
    store: &BackupStore,
    encryptor: &Encryptor,
    local_path: &Path,
    passphrase: Option<&SecretString>,
    folder: Option<&str>,
) -> Result<BackupResult> {
    let plaintext = tokio::fs::read(local_path)
        .await
        .with_context(|| format!("reading: {}", local_path.display()))?;
    let bytes = plaintext.len() as u64;

    let name = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no usable file name: {}", local_path.display()))?
        .to_string();

    let taken_at = tokio::fs::metadata(local_path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    debug!(path = %local_path.display(), bytes, "encrypting");
    let enc = encryptor.clone();
    let pass = passphrase.map(copy_secret);
    let envelope =
        tokio::task::spawn_blocking(move || enc.encrypt_file(&plaintext, pass.as_ref()))
            .await
            .context("encryption task")?
            .with_context(|| format!("encrypting: {}", local_path.display()))?;

    let protected = envelope.is_key_protected();
    let record = store
        .upload(UploadRequest {
            original_filename: name,
            size: bytes,
            envelope,
            folder: folder.map(str::to_string),
            metadata: Some(PhotoMetadata {
                taken_at,
                ..Default::default()
            }),
        })
        .await
        .with_context(|| format!("uploading: {}", local_path.display()))?;

    info!(
        path = %local_path.display(),
        id = %record.id,
        bytes,
        protected,
        "backed up"
    );

    Ok(BackupResult {
        path: local_path.to_path_buf(),
        id: record.id,
        bytes,
        encrypted_bytes: record.encrypted_size,
        protected,
    })
}

/// Download and decrypt a stored file to `dest`.
///
/// If `dest` is an existing directory the original file name is used inside
/// it. The plaintext is written to a temp file and renamed into place; on
/// any decryption failure nothing is written.
pub async fn restore_file(
    store: &BackupStore,
    encryptor: &Encryptor,
    id: &str,
    dest: &Path,
    passphrase: Option<&SecretString>,
) -> Result<RestoreResult> {
    let (record, envelope) = store
        .download(id)
        .await
        .with_context(|| format!("downloading: {id}"))?;

    let local_path = if dest.is_dir() {
        dest.join(local_file_name(&record.original_filename, &record.id))
    } else {
        dest.to_path_buf()
    };

    let enc = encryptor.clone();
    let pass = passphrase.map(copy_secret);
    let plaintext = tokio::task::spawn_blocking(move || enc.decrypt_file(&envelope, pass.as_ref()))
        .await
        .context("decryption task")?
        .with_context(|| format!("decrypting: {}", record.original_filename))?;
    let bytes = plaintext.len() as u64;

    if let Some(parent) = local_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }
    }

    write_atomically(&local_path, &plaintext).await?;

    info!(id = %record.id, local = %local_path.display(), bytes, "restored");

    Ok(RestoreResult {
        id: record.id,
        local_path,
        bytes,
    })
}

/// Back up many files with at most `concurrency` in flight (0 = cpu count).
///
/// Returns one outcome per input path, in input order. A failing file never
/// stops the others. `progress` is called as each file finishes.
pub async fn backup_batch(
    store: &BackupStore,
    encryptor: &Encryptor,
    paths: &[PathBuf],
    passphrase: Option<&SecretString>,
    folder: Option<&str>,
    concurrency: usize,
    progress: Option<&ProgressFn>,
) -> Vec<FileOutcome> {
    let concurrency = effective_concurrency(concurrency);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    debug!(files = paths.len(), concurrency, "starting batch backup");

    let mut tasks = JoinSet::new();
    for (idx, path) in paths.iter().enumerate() {
        let store = store.clone();
        let encryptor = encryptor.clone();
        let passphrase = passphrase.map(copy_secret);
        let folder = folder.map(str::to_string);
        let path = path.clone();
        let sem = semaphore.clone();

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await;
            let result = backup_file(
                &store,
                &encryptor,
                &path,
                passphrase.as_ref(),
                folder.as_deref(),
            )
            .await;
            (idx, result)
        });
    }

    let total = paths.len() as u64;
    let mut done = 0u64;
    let mut slots: Vec<Option<std::result::Result<BackupResult, PvaultError>>> =
        paths.iter().map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        done += 1;
        match joined {
            Ok((idx, result)) => {
                let path = &paths[idx];
                if let Err(e) = &result {
                    warn!(path = %path.display(), error = %format!("{e:#}"), "backup failed");
                }
                if let Some(cb) = progress {
                    cb(done, total, &path.display().to_string());
                }
                slots[idx] = Some(result.map_err(classify));
            }
            Err(e) => warn!(error = %e, "backup task did not complete"),
        }
    }

    let outcomes: Vec<FileOutcome> = paths
        .iter()
        .zip(slots)
        .map(|(path, slot)| FileOutcome {
            path: path.clone(),
            result: slot.unwrap_or_else(|| {
                Err(PvaultError::Other(anyhow::anyhow!("backup task aborted")))
            }),
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(files = outcomes.len(), failed, "batch backup complete");
    outcomes
}

/// Final path component of a stored name, or the record id when the name
/// has none that is safe to join onto a local directory.
fn local_file_name(stored: &str, id: &str) -> String {
    let last = stored.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => id.to_string(),
        name if name.contains('\0') => id.to_string(),
        name => name.to_string(),
    }
}

/// Write through a sibling temp file and rename it into place. The temp
/// file is removed if either step fails.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let written = match tokio::fs::write(&tmp, data).await {
        Ok(()) => tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming to: {}", path.display())),
        Err(e) => Err(e).with_context(|| format!("writing tmp: {}", tmp.display())),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}

/// Sibling temp file: `photo.jpg` becomes `photo.jpg.pvault_tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".pvault_tmp");
    PathBuf::from(os)
}

fn effective_concurrency(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn copy_secret(s: &SecretString) -> SecretString {
    SecretString::from(s.expose_secret())
}

/// Sort a pipeline error by its root cause, keeping the context chain in the
/// message.
fn classify(err: anyhow::Error) -> PvaultError {
    let message = format!("{err:#}");
    if err.downcast_ref::<CryptoError>().is_some() {
        PvaultError::Crypto(message)
    } else if err.downcast_ref::<StorageError>().is_some() {
        PvaultError::Storage(message)
    } else {
        PvaultError::Other(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_concurrency() {
        assert_eq!(effective_concurrency(3), 3);
        assert!(effective_concurrency(0) >= 1);
    }

    #[test]
    fn test_local_file_name_strips_directories() {
        let id = "9b2e6f4a-1c3d-4e5f-8a9b-0c1d2e3f4a5b";
        assert_eq!(local_file_name("sunset.jpg", id), "sunset.jpg");
        assert_eq!(local_file_name("../escaped.jpg", id), "escaped.jpg");
        assert_eq!(local_file_name("/etc/passwd", id), "passwd");
        assert_eq!(local_file_name("..\\..\\win.ini", id), "win.ini");
        assert_eq!(local_file_name("..", id), id);
        assert_eq!(local_file_name("a/.", id), id);
        assert_eq!(local_file_name("dir/", id), id);
        assert_eq!(local_file_name("", id), id);
    }

    #[test]
    fn test_temp_path_keeps_full_name() {
        assert_eq!(
            temp_path(Path::new("/out/photo.jpg")),
            PathBuf::from("/out/photo.jpg.pvault_tmp")
        );
        assert_ne!(
            temp_path(Path::new("/out/photo.jpg")),
            temp_path(Path::new("/out/photo.png"))
        );
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("photo.jpg");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let err = write_atomically(&target, b"pixels").await.unwrap_err();
        assert!(format!("{err:#}").contains("renaming to"));
        assert!(!temp_path(&target).exists());
        assert!(target.join("occupied").is_dir());
    }

    #[tokio::test]
    async fn test_write_atomically_replaces_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("photo.jpg");
        std::fs::write(&target, b"old").unwrap();

        write_atomically(&target, b"new").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert!(!temp_path(&target).exists());
    }

    #[test]
    fn test_classify_crypto_through_context() {
        let err = anyhow::Error::new(CryptoError::WrongPassphrase).context("decrypting: a.jpg");
        match classify(err) {
            PvaultError::Crypto(msg) => {
                assert!(msg.contains("a.jpg"));
                assert!(msg.contains("incorrect passphrase"));
            }
            other => panic!("expected crypto error, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_storage_and_other() {
        let err = anyhow::Error::new(StorageError::NotFound("x".into()));
        assert!(matches!(classify(err), PvaultError::Storage(_)));

        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::NotFound))
            .context("reading: /nope.jpg");
        match classify(err) {
            PvaultError::Other(e) => assert!(format!("{e:#}").contains("/nope.jpg")),
            other => panic!("expected other, got {other:?}"),
        }

        assert!(matches!(
            classify(anyhow::anyhow!("boom")),
            PvaultError::Other(_)
        ));
    }
}
