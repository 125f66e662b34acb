//! File-backed versioned resource store for Gavel.
//!
//! This crate provides the storage layer: a `ResourceStore` of per-record
//! JSON files with embedded blake3 checksums and atomic writes, soft-delete
//! aware listing, a `CommitJournal` implementing the compute-then-commit
//! batch with rollback and startup recovery, a `StoreLayout` for directory
//! structure, and an advisory `StoreLock`.

pub mod journal;
pub mod layout;
pub mod lock;
pub mod records;

pub use journal::{CommitJournal, JournalEntry, RollbackStep};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use lock::StoreLock;
pub use records::{ListFilter, ResourceStore};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("integrity check failed for resource '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}
