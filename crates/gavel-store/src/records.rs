use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use gavel_schema::{Resource, ResourceId, ResourceKind};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Filter for [`ResourceStore::list`]. Soft-deleted records are excluded
/// unless `include_deleted` is set.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<ResourceKind>,
    /// Only records referencing this design (components and tests).
    pub design_id: Option<ResourceId>,
    pub include_deleted: bool,
}

impl ListFilter {
    /// Whether a record passes this filter.
    pub fn matches(&self, resource: &Resource) -> bool {
        if !self.include_deleted && resource.is_deleted() {
            return false;
        }
        if let Some(kind) = self.kind {
            if resource.kind() != kind {
                return false;
            }
        }
        if let Some(design_id) = &self.design_id {
            if resource.design_ref() != Some(design_id) {
                return false;
            }
        }
        true
    }
}

/// One JSON file per resource record, written atomically with an embedded
/// blake3 checksum. Records are only ever soft-deleted; nothing here removes
/// a file except journal rollback.
pub struct ResourceStore {
    layout: StoreLayout,
}

fn compute_checksum(resource: &Resource) -> Result<String, StoreError> {
    let mut copy = resource.clone();
    copy.checksum = None;
    // Serialize without the checksum field (skip_serializing_if = None)
    let json = serde_json::to_string_pretty(&copy)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

impl ResourceStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Path of the record file for the given id.
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.layout.resources_dir().join(format!("{id}.json"))
    }

    pub fn put(&self, resource: &Resource) -> Result<(), StoreError> {
        let dest = self.record_path(&resource.id);

        let mut with_checksum = resource.clone();
        with_checksum.checksum = Some(compute_checksum(&with_checksum)?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let dir = self.layout.resources_dir();
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(())
    }

    /// Fetch a record by id. Soft-deleted records are returned as-is; callers
    /// decide whether `deleted_at` matters for their operation.
    pub fn get(&self, id: &str) -> Result<Resource, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        let resource: Resource = serde_json::from_str(&content)?;

        if let Some(ref expected) = resource.checksum {
            let actual = compute_checksum(&resource)?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    id: id.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(resource)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).exists()
    }

    /// List records matching the filter, sorted by id. Corrupted entries are
    /// skipped with a warning so one bad file cannot poison every listing.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, StoreError> {
        let dir = self.layout.resources_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get(id) {
                Ok(resource) => {
                    if filter.matches(&resource) {
                        results.push(resource);
                    }
                }
                Err(e) => {
                    tracing::warn!("skipping corrupted resource record '{id}': {e}");
                }
            }
        }
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }
}
