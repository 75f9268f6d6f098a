//! pvault-storage: OpenDAL-backed store for encrypted photo blobs and their records

pub mod health;
pub mod operator;
pub mod store;

pub use health::check_health;
pub use operator::{build_operator, check_endpoint, open_store, BucketCredentials};
pub use store::{
    BackupStore, FolderSummary, StorageError, StorageResult, StorageUsage, StoredFile,
    UploadRequest,
};
