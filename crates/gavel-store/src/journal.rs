use crate::layout::StoreLayout;
use crate::records::ResourceStore;
use crate::{fsync_dir, StoreError};
use gavel_schema::Resource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A single rollback step that can undo one staged record write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RollbackStep {
    /// Restore a record file to its pre-batch content.
    RestoreFile { path: PathBuf, content: String },
    /// Remove a record file that did not exist before the batch.
    RemoveFile(PathBuf),
}

/// A journal entry covering one atomic write batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub op_id: String,
    pub timestamp: String,
    pub steps: Vec<RollbackStep>,
}

/// Commit journal for atomic write batches.
///
/// The engine computes every write (primary plus cascades) before committing
/// any of them. `commit` journals the prior state of each touched record
/// first, then applies the whole batch; a mid-batch failure rolls back the
/// writes already applied. On startup, entries left behind by a crash are
/// rolled back by [`recover`](Self::recover).
pub struct CommitJournal {
    journal_dir: PathBuf,
}

impl CommitJournal {
    pub fn new(layout: &StoreLayout) -> Self {
        Self {
            journal_dir: layout.journal_dir(),
        }
    }

    /// Ensure the journal directory exists.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.journal_dir)?;
        Ok(())
    }

    /// Apply a write batch as one atomic unit.
    ///
    /// Either every record in `writes` lands in the store, or none do.
    pub fn commit(
        &self,
        op_id: &str,
        writes: &[Resource],
        store: &ResourceStore,
    ) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut steps = Vec::with_capacity(writes.len());
        for write in writes {
            let path = store.record_path(&write.id);
            if path.exists() {
                steps.push(RollbackStep::RestoreFile {
                    content: fs::read_to_string(&path)?,
                    path,
                });
            } else {
                steps.push(RollbackStep::RemoveFile(path));
            }
        }

        let entry = JournalEntry {
            op_id: op_id.to_owned(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            steps,
        };
        self.write_entry(&entry)?;
        debug!("journal begin: {op_id} ({} writes)", writes.len());

        for (i, write) in writes.iter().enumerate() {
            if let Err(e) = store.put(write) {
                warn!(
                    "batch write {i} of {} failed for '{}', rolling back: {e}",
                    writes.len(),
                    write.id
                );
                rollback_steps(&entry.steps);
                let _ = fs::remove_file(self.entry_path(op_id));
                return Err(e);
            }
        }

        fs::remove_file(self.entry_path(op_id))?;
        fsync_dir(&self.journal_dir)?;
        debug!("journal commit: {op_id}");
        Ok(())
    }

    /// List all incomplete journal entries, oldest first.
    pub fn list_incomplete(&self) -> Result<Vec<JournalEntry>, StoreError> {
        if !self.journal_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.journal_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<JournalEntry>(&content) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            warn!("corrupt journal entry {}: {e}", path.display());
                            let _ = fs::remove_file(&path);
                        }
                    },
                    Err(e) => {
                        warn!("unreadable journal entry {}: {e}", path.display());
                        let _ = fs::remove_file(&path);
                    }
                }
            }
        }
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(entries)
    }

    /// Roll back all incomplete journal entries left by a crash.
    /// Returns the number of entries rolled back.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let entries = self.list_incomplete()?;
        let count = entries.len();
        for entry in &entries {
            info!(
                "journal recovery: rolling back batch {} ({} steps)",
                entry.op_id,
                entry.steps.len()
            );
            rollback_steps(&entry.steps);
            let _ = fs::remove_file(self.entry_path(&entry.op_id));
        }
        if count > 0 {
            info!("journal recovery complete: {count} batches rolled back");
        }
        Ok(count)
    }

    fn entry_path(&self, op_id: &str) -> PathBuf {
        self.journal_dir.join(format!("{op_id}.json"))
    }

    fn write_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        fs::create_dir_all(&self.journal_dir)?;
        let content = serde_json::to_string_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(&self.journal_dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        let dest = self.entry_path(&entry.op_id);
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&self.journal_dir)?;
        Ok(())
    }
}

/// Execute rollback steps in reverse order. Failures are logged, not
/// propagated: recovery must make as much progress as it can.
fn rollback_steps(steps: &[RollbackStep]) {
    for step in steps.iter().rev() {
        match step {
            RollbackStep::RestoreFile { path, content } => {
                if let Err(e) = fs::write(path, content) {
                    warn!("rollback: failed to restore {}: {e}", path.display());
                } else {
                    debug!("rollback: restored {}", path.display());
                }
            }
            RollbackStep::RemoveFile(path) => {
                if path.exists() {
                    if let Err(e) = fs::remove_file(path) {
                        warn!("rollback: failed to remove {}: {e}", path.display());
                    } else {
                        debug!("rollback: removed {}", path.display());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_schema::{DesignSpec, DesignStatus, Metadata, Quantity, ResourceBody, ResourceId};

    fn setup() -> (tempfile::TempDir, ResourceStore, CommitJournal) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let store = ResourceStore::new(layout.clone());
        let journal = CommitJournal::new(&layout);
        journal.initialize().unwrap();
        (dir, store, journal)
    }

    fn design(id: &str, revision: u32) -> Resource {
        Resource {
            id: ResourceId::new(id),
            body: ResourceBody::Design(DesignSpec {
                name: "wing".to_owned(),
                status: DesignStatus::Draft,
                revision,
                description: None,
                capacity: Quantity::new(42500.0, "kg"),
                wingspan: None,
            }),
            meta: Metadata::new("2025-01-01T00:00:00Z"),
            checksum: None,
        }
    }

    #[test]
    fn commit_applies_all_writes() {
        let (_dir, store, journal) = setup();
        journal
            .commit("op1", &[design("d1", 1), design("d2", 1)], &store)
            .unwrap();
        assert!(store.exists("d1"));
        assert!(store.exists("d2"));
        assert!(journal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn empty_batch_is_noop() {
        let (_dir, store, journal) = setup();
        journal.commit("op1", &[], &store).unwrap();
        assert!(journal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn recover_rolls_back_created_records() {
        let (_dir, store, journal) = setup();

        // Simulate a crash after the journal entry and one write landed.
        let entry = JournalEntry {
            op_id: "crashed".to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            steps: vec![RollbackStep::RemoveFile(store.record_path("d1"))],
        };
        journal.write_entry(&entry).unwrap();
        store.put(&design("d1", 1)).unwrap();

        let count = journal.recover().unwrap();
        assert_eq!(count, 1);
        assert!(!store.exists("d1"), "partial write must be rolled back");
        assert!(journal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn recover_restores_prior_content() {
        let (_dir, store, journal) = setup();
        store.put(&design("d1", 1)).unwrap();
        let prior = fs::read_to_string(store.record_path("d1")).unwrap();

        let entry = JournalEntry {
            op_id: "crashed".to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            steps: vec![RollbackStep::RestoreFile {
                path: store.record_path("d1"),
                content: prior,
            }],
        };
        journal.write_entry(&entry).unwrap();
        store.put(&design("d1", 7)).unwrap();

        journal.recover().unwrap();
        let back = store.get("d1").unwrap();
        assert_eq!(
            back.as_design().unwrap().revision,
            1,
            "record must be restored to pre-batch content"
        );
    }

    #[test]
    fn recover_with_no_entries_is_noop() {
        let (_dir, _store, journal) = setup();
        assert_eq!(journal.recover().unwrap(), 0);
    }

    #[test]
    fn recover_removes_corrupt_entries() {
        let (dir, store, journal) = setup();
        let journal_dir = dir.path().join("store").join("journal");
        fs::write(journal_dir.join("corrupt.json"), "NOT JSON{{{").unwrap();

        let entry = JournalEntry {
            op_id: "valid".to_owned(),
            timestamp: "2025-01-01T00:00:00Z".to_owned(),
            steps: vec![RollbackStep::RemoveFile(store.record_path("d1"))],
        };
        journal.write_entry(&entry).unwrap();
        store.put(&design("d1", 1)).unwrap();

        let count = journal.recover().unwrap();
        assert_eq!(count, 1, "only the valid entry counts");
        assert!(!store.exists("d1"));
        assert!(!journal_dir.join("corrupt.json").exists());
        assert!(journal.list_incomplete().unwrap().is_empty());
    }

    #[test]
    fn overwrite_batch_journals_prior_state() {
        let (_dir, store, journal) = setup();
        store.put(&design("d1", 1)).unwrap();

        journal.commit("op1", &[design("d1", 2)], &store).unwrap();
        assert_eq!(store.get("d1").unwrap().as_design().unwrap().revision, 2);
        assert!(journal.list_incomplete().unwrap().is_empty());
    }
}
