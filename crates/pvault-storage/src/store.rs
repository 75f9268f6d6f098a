//! Encrypted file store on top of an OpenDAL operator.
//!
//! Layout under the configured prefix:
//!
//! ```text
//! {prefix}/blobs/{id}        ciphertext || tag
//! {prefix}/files/{id}.json   StoredFile record (file metadata + sidecar)
//! ```
//!
//! Uploads write the blob before the record and deletes remove the record
//! before the blob, so a record never points at a missing blob. A crash
//! between the two steps leaves an orphan blob only.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use opendal::Operator;
use pvault_core::types::PhotoMetadata;
use pvault_crypto::{CryptoError, Envelope, Sidecar};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("storage backend: {0}")]
    Backend(#[from] opendal::Error),

    #[error("file record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("stored envelope: {0}")]
    Envelope(#[from] CryptoError),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Server-side record of one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub original_filename: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Ciphertext size in bytes (plaintext + 16-byte tag)
    pub encrypted_size: u64,
    /// Upload time, unix seconds
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PhotoMetadata>,
    pub encryption: Sidecar,
}

/// A freshly encrypted file on its way to the store.
/// One folder as seen by `folders()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSummary {
    pub name: String,
    pub file_count: u64,
    /// Plaintext bytes
    pub bytes: u64,
}

/// Totals reported by `usage()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub files: u64,
    pub bytes: u64,
    pub encrypted_bytes: u64,
}

#[derive(Debug)]
pub struct UploadRequest {
    pub original_filename: String,
    pub size: u64,
    pub envelope: Envelope,
    pub folder: Option<String>,
    pub metadata: Option<PhotoMetadata>,
}

/// Blob + record store rooted at `prefix`.
#[derive(Clone)]
pub struct BackupStore {
    op: Operator,
    prefix: String,
}

impl BackupStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Key prefix with surrounding slashes removed.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, rel: &str) -> String {
        if self.prefix.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", self.prefix, rel)
        }
    }

    fn blob_key(&self, id: &str) -> String {
        self.key(&format!("blobs/{id}"))
    }

    fn record_key(&self, id: &str) -> String {
        self.key(&format!("files/{id}.json"))
    }

    /// Store an envelope and its record. Returns the new record.
    pub async fn upload(&self, req: UploadRequest) -> StorageResult<StoredFile> {
        let original_filename = normalize_name(&req.original_filename)?;
        let folder = req.folder.as_deref().and_then(normalize_folder);
        let id = Uuid::new_v4().to_string();

        if !req.envelope.is_key_protected() {
            warn!(
                id = %id,
                "uploading envelope without passphrase protection; its key is stored alongside it"
            );
        }

        let encryption = req.envelope.sidecar();
        let ciphertext = req.envelope.into_ciphertext();
        let record = StoredFile {
            id: id.clone(),
            original_filename,
            size: req.size,
            encrypted_size: ciphertext.len() as u64,
            created_at: now_unix(),
            folder,
            metadata: req.metadata.filter(|m| !m.is_empty()),
            encryption,
        };

        self.op.write(&self.blob_key(&id), ciphertext).await?;
        self.write_record(&record).await?;

        info!(
            id = %record.id,
            name = %record.original_filename,
            bytes = record.encrypted_size,
            protected = record.encryption.is_key_protected,
            "uploaded"
        );
        Ok(record)
    }

    /// Fetch the record for `id`.
    pub async fn get(&self, id: &str) -> StorageResult<StoredFile> {
        let id = parse_id(id)?;
        match self.op.read(&self.record_key(&id)).await {
            Ok(buf) => Ok(serde_json::from_slice(&buf.to_vec())?),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Err(StorageError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the record and reassemble the stored envelope.
    pub async fn download(&self, id: &str) -> StorageResult<(StoredFile, Envelope)> {
        let record = self.get(id).await?;
        let ciphertext = match self.op.read(&self.blob_key(&record.id)).await {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(record.id))
            }
            Err(e) => return Err(e.into()),
        };

        if ciphertext.len() as u64 != record.encrypted_size {
            warn!(
                id = %record.id,
                expected = record.encrypted_size,
                actual = ciphertext.len(),
                "blob size differs from record"
            );
        }

        let envelope = Envelope::from_parts(ciphertext, &record.encryption)?;
        info!(id = %record.id, name = %record.original_filename, "downloaded");
        Ok((record, envelope))
    }

    /// All records, optionally restricted to one folder, oldest first.
    pub async fn list(&self, folder: Option<&str>) -> StorageResult<Vec<StoredFile>> {
        let dir = self.key("files/");
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let folder = folder.and_then(normalize_folder);

        let mut files = Vec::new();
        for entry in entries {
            if !entry.name().ends_with(".json") {
                continue;
            }
            let buf = self.op.read(entry.path()).await?;
            let record: StoredFile = match serde_json::from_slice(&buf.to_vec()) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %entry.path(), error = %e, "skipping unreadable file record");
                    continue;
                }
            };
            if folder.is_none() || record.folder == folder {
                files.push(record);
            }
        }

        files.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.original_filename.cmp(&b.original_filename))
        });
        debug!(count = files.len(), "listed file records");
        Ok(files)
    }

    /// Change the display name of a stored file. The blob is untouched.
    pub async fn rename(&self, id: &str, new_name: &str) -> StorageResult<StoredFile> {
        let new_name = normalize_name(new_name)?;
        let mut record = self.get(id).await?;
        let old = std::mem::replace(&mut record.original_filename, new_name);
        self.write_record(&record).await?;
        info!(id = %record.id, from = %old, to = %record.original_filename, "renamed");
        Ok(record)
    }

    /// Remove a stored file: record first, then its blob.
    ///
    /// A failure between the two steps leaves an orphan blob, which is never
    /// listed, rather than a record whose blob is gone.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let record = self.get(id).await?;
        self.remove(&record).await?;
        info!(id = %record.id, name = %record.original_filename, "deleted");
        Ok(())
    }

    /// Put a stored file into `folder`, or back at the top level with `None`.
    pub async fn move_file(&self, id: &str, folder: Option<&str>) -> StorageResult<StoredFile> {
        let mut record = self.get(id).await?;
        let folder = folder.and_then(normalize_folder);
        let old = std::mem::replace(&mut record.folder, folder);
        self.write_record(&record).await?;
        info!(
            id = %record.id,
            from = old.as_deref().unwrap_or("/"),
            to = record.folder.as_deref().unwrap_or("/"),
            "moved"
        );
        Ok(record)
    }

    /// Every folder that holds at least one file, with per-folder totals.
    /// Folders exist only as an attribute of their files.
    pub async fn folders(&self) -> StorageResult<Vec<FolderSummary>> {
        let mut folders: BTreeMap<String, FolderSummary> = BTreeMap::new();
        for record in self.list(None).await? {
            let Some(name) = record.folder else { continue };
            let entry = folders.entry(name.clone()).or_insert_with(|| FolderSummary {
                name,
                file_count: 0,
                bytes: 0,
            });
            entry.file_count += 1;
            entry.bytes += record.size;
        }
        Ok(folders.into_values().collect())
    }

    /// Rename `old` to `new`, carrying its subfolders along. Returns the
    /// number of files whose folder changed.
    pub async fn rename_folder(&self, old: &str, new: &str) -> StorageResult<usize> {
        let old = normalize_folder(old).ok_or_else(|| StorageError::InvalidName(old.to_string()))?;
        let new = normalize_folder(new).ok_or_else(|| StorageError::InvalidName(new.to_string()))?;

        let mut moved = 0;
        for mut record in self.list(None).await? {
            let Some(current) = record.folder.as_deref() else { continue };
            let Some(rest) = folder_suffix(current, &old) else { continue };
            let renamed = format!("{new}{rest}");
            record.folder = Some(renamed);
            self.write_record(&record).await?;
            moved += 1;
        }

        if moved == 0 {
            return Err(StorageError::NotFound(old));
        }
        info!(from = %old, to = %new, files = moved, "renamed folder");
        Ok(moved)
    }

    /// Delete every file in `folder` and its subfolders. Returns the number
    /// of files removed.
    pub async fn delete_folder(&self, folder: &str) -> StorageResult<usize> {
        let folder =
            normalize_folder(folder).ok_or_else(|| StorageError::InvalidName(folder.to_string()))?;

        let mut removed = 0;
        for record in self.list(None).await? {
            let inside = record
                .folder
                .as_deref()
                .is_some_and(|f| folder_suffix(f, &folder).is_some());
            if inside {
                self.remove(&record).await?;
                removed += 1;
            }
        }

        if removed == 0 {
            return Err(StorageError::NotFound(folder));
        }
        info!(folder = %folder, files = removed, "deleted folder");
        Ok(removed)
    }

    /// Totals across every stored file.
    pub async fn usage(&self) -> StorageResult<StorageUsage> {
        let files = self.list(None).await?;
        let usage = StorageUsage {
            files: files.len() as u64,
            bytes: files.iter().map(|f| f.size).sum(),
            encrypted_bytes: files.iter().map(|f| f.encrypted_size).sum(),
        };
        debug!(files = usage.files, bytes = usage.bytes, "computed usage");
        Ok(usage)
    }

    async fn remove(&self, record: &StoredFile) -> StorageResult<()> {
        self.op.delete(&self.record_key(&record.id)).await?;
        self.op.delete(&self.blob_key(&record.id)).await?;
        Ok(())
    }

    async fn write_record(&self, record: &StoredFile) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(record)?;
        self.op.write(&self.record_key(&record.id), json).await?;
        Ok(())
    }
}

/// Ids are UUIDs; anything else cannot name a stored file.
fn parse_id(id: &str) -> StorageResult<String> {
    Uuid::parse_str(id.trim())
        .map(|u| u.to_string())
        .map_err(|_| StorageError::NotFound(id.to_string()))
}

/// Names become local file names on restore, so they must be a single
/// path component.
fn normalize_name(name: &str) -> StorageResult<String> {
    let trimmed = name.trim();
    let unusable = matches!(trimmed, "" | "." | "..")
        || trimmed.contains(['/', '\\', '\0']);
    if unusable {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_folder(folder: &str) -> Option<String> {
    let trimmed = folder.trim().trim_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The part of `folder` below `root`, if `folder` is `root` or nested in it.
fn folder_suffix<'a>(folder: &'a str, root: &str) -> Option<&'a str> {
    let rest = folder.strip_prefix(root)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_under_prefix() {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        let store = BackupStore::new(op.clone(), "/backup/");
        assert_eq!(store.blob_key("abc"), "backup/blobs/abc");
        assert_eq!(store.record_key("abc"), "backup/files/abc.json");

        let bare = BackupStore::new(op, "");
        assert_eq!(bare.blob_key("abc"), "blobs/abc");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  beach.jpg ").unwrap(), "beach.jpg");
        assert!(matches!(normalize_name("   "), Err(StorageError::InvalidName(_))));
        assert!(normalize_name("../etc/passwd").is_err());
        assert!(normalize_name("..").is_err());
        assert!(normalize_name(" . ").is_err());
        assert!(normalize_name("..\\boot.ini").is_err());
        assert_eq!(normalize_name("..hidden.jpg").unwrap(), "..hidden.jpg");
    }

    #[test]
    fn test_folder_suffix() {
        assert_eq!(folder_suffix("trip", "trip"), Some(""));
        assert_eq!(folder_suffix("trip/day1", "trip"), Some("/day1"));
        assert_eq!(folder_suffix("trips", "trip"), None);
        assert_eq!(folder_suffix("other", "trip"), None);
    }

    #[test]
    fn test_normalize_folder() {
        assert_eq!(normalize_folder("/2024/summer/").as_deref(), Some("2024/summer"));
        assert_eq!(normalize_folder(" / "), None);
    }

    #[test]
    fn test_parse_id_rejects_paths() {
        assert!(matches!(
            parse_id("../files/x"),
            Err(StorageError::NotFound(_))
        ));
        let id = Uuid::new_v4().to_string();
        assert_eq!(parse_id(&id).unwrap(), id);
    }

    #[test]
    fn test_record_json_shape() {
        let envelope = pvault_crypto::encrypt_file(b"img", None).unwrap();
        let record = StoredFile {
            id: "00000000-0000-4000-8000-000000000000".into(),
            original_filename: "a.jpg".into(),
            size: 3,
            encrypted_size: 19,
            created_at: 1_700_000_000,
            folder: None,
            metadata: None,
            encryption: envelope.sidecar(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["originalFilename"], "a.jpg");
        assert_eq!(json["encryptedSize"], 19);
        assert_eq!(json["encryption"]["isKeyProtected"], false);
        assert!(json.get("folder").is_none());
    }
}
