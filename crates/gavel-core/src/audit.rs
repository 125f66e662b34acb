//! Audit trail of every processed mutation.
//!
//! The engine reports each submission — accepted, rejected, or failed with an
//! internal error — to an [`AuditSink`]. The default sink appends JSON lines
//! to `store/audit.log`; sink failures are logged and never fail the
//! submission itself, since the commit has already happened by the time the
//! entry is recorded.

use crate::violation::Violation;
use gavel_schema::{OpId, Operation, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Final disposition of a processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Accepted,
    Rejected,
    /// The evaluation itself failed (I/O, corrupt store). Nothing was written.
    Error,
}

/// One audit record, serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub op_id: OpId,
    pub timestamp: String,
    pub operation: Operation,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// Destination for audit entries. Implementations must never panic; a lost
/// audit entry is a warning, not a failed mutation.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Emits audit entries as tracing events only. Useful when no store is
/// mounted, e.g. for dry-run evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            op_id = %entry.op_id,
            operation = %entry.operation,
            kind = %entry.kind,
            outcome = ?entry.outcome,
            violations = entry.violations.len(),
            "audit"
        );
    }
}

/// Appends one JSON line per entry to the store's audit log.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_all()
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.append(entry) {
            tracing::warn!("failed to append audit entry {}: {e}", entry.op_id);
        }
    }
}

/// Collects entries in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

/// Read the full audit log, oldest first. Unparseable lines are skipped with
/// a warning so a torn final line cannot hide the rest of the trail.
pub fn read_audit_log(path: impl AsRef<Path>) -> std::io::Result<Vec<AuditEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let mut entries = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("skipping malformed audit line {}: {e}", lineno + 1);
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{rules, ViolationClass};
    use std::fs;

    fn sample_entry(op_id: &str, outcome: AuditOutcome) -> AuditEntry {
        AuditEntry {
            op_id: OpId::new(op_id),
            timestamp: "2025-03-01T09:00:00+00:00".to_owned(),
            operation: Operation::Create,
            kind: ResourceKind::Design,
            resource_id: Some(ResourceId::new("d1")),
            outcome,
            violations: Vec::new(),
        }
    }

    #[test]
    fn jsonl_sink_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = JsonlAuditSink::new(&path);

        sink.record(&sample_entry("op1", AuditOutcome::Accepted));
        let mut rejected = sample_entry("op2", AuditOutcome::Rejected);
        rejected.violations.push(Violation::new(
            rules::CAPACITY_EXCEEDED,
            ViolationClass::Aggregate,
            None,
            "over capacity",
        ));
        sink.record(&rejected);

        let entries = read_audit_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].op_id.as_str(), "op1");
        assert_eq!(entries[0].outcome, AuditOutcome::Accepted);
        assert_eq!(entries[1].outcome, AuditOutcome::Rejected);
        assert_eq!(entries[1].violations.len(), 1);
    }

    #[test]
    fn read_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_audit_log(dir.path().join("audit.log")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn torn_line_does_not_hide_earlier_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = JsonlAuditSink::new(&path);
        sink.record(&sample_entry("op1", AuditOutcome::Accepted));

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("{\"op_id\":\"op2\",\"trunc");
        fs::write(&path, content).unwrap();

        let entries = read_audit_log(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op_id.as_str(), "op1");
    }

    #[test]
    fn memory_sink_collects_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&sample_entry("op1", AuditOutcome::Accepted));
        sink.record(&sample_entry("op2", AuditOutcome::Error));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].outcome, AuditOutcome::Error);
    }

    #[test]
    fn entry_serde_roundtrip() {
        let entry = sample_entry("op1", AuditOutcome::Rejected);
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
