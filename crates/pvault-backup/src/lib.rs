//! pvault-backup: local file ⇄ encrypted store pipeline

pub mod engine;

pub use engine::{
    backup_batch, backup_file, restore_file, BackupResult, FileOutcome, ProgressFn, RestoreResult,
};
