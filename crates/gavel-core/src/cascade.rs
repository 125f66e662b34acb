//! Cascade planning for multi-record mutations.
//!
//! A cascade is computed fully before anything is written: the planner
//! produces either the complete write batch (primary record plus every
//! secondary write) or the violations that block it. The engine then commits
//! the batch through the journal as one atomic unit.

use crate::consistency::Snapshot;
use crate::violation::{rules, Evaluation, Violation, ViolationClass};
use crate::CoreError;
use gavel_schema::{Resource, ResourceBody, ResourceKind};
use gavel_store::ListFilter;

/// Plan the soft-delete of a design.
///
/// A draft or rejected design may be deleted at any time; its live components
/// are de-referenced (`design_id` cleared) in the same batch so they never
/// dangle. Once a design is approved its bill of materials is a record of
/// what was signed off, so deletion is blocked while live components remain.
pub fn compute_design_delete(
    snapshot: &Snapshot<'_>,
    design_record: &Resource,
    now: &str,
) -> Result<Evaluation, CoreError> {
    let Some(design) = design_record.as_design() else {
        return Ok(Evaluation::Rejected {
            violations: vec![Violation::new(
                rules::TARGET_KIND,
                ViolationClass::Reference,
                None,
                format!("resource '{}' is not a design", design_record.id),
            )],
        });
    };

    let live_components = snapshot.list(&ListFilter {
        kind: Some(ResourceKind::Component),
        design_id: Some(design_record.id.clone()),
        include_deleted: false,
    })?;

    if design.status.is_approved_or_later() && !live_components.is_empty() {
        return Ok(Evaluation::Rejected {
            violations: vec![Violation::new(
                rules::DELETE_BLOCKED,
                ViolationClass::Conflict,
                None,
                format!(
                    "design '{}' is {} and still has {} live component(s)",
                    design_record.id,
                    design.status,
                    live_components.len()
                ),
            )],
        });
    }

    let mut writes = Vec::with_capacity(1 + live_components.len());

    let mut deleted = design_record.clone();
    deleted.meta.updated_at = now.to_owned();
    deleted.meta.deleted_at = Some(now.to_owned());
    deleted.checksum = None;
    writes.push(deleted);

    for mut component in live_components {
        if let ResourceBody::Component(spec) = &mut component.body {
            spec.design_id = None;
        }
        component.meta.updated_at = now.to_owned();
        component.checksum = None;
        writes.push(component);
    }

    Ok(Evaluation::Accepted { writes })
}
