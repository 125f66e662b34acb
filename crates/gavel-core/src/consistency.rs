//! Cross-resource invariant checks.
//!
//! These rules read sibling, parent, and child records through a [`Snapshot`]
//! — the store overlaid with the staged writes of the request being
//! evaluated — so the same checks serve both the pre-commit evaluation and
//! the re-validation of cascade writes against the post-image. Every
//! applicable rule is evaluated; nothing stops at the first violation.

use crate::violation::{rules, Violation, ViolationClass};
use crate::CoreError;
use gavel_schema::{
    convert, DesignSpec, DesignStatus, Dimension, Resource, ResourceId, ResourceKind, TestOutcome,
    EPSILON,
};
use gavel_store::{ListFilter, ResourceStore};
use std::collections::BTreeMap;

/// Read view combining the store with the staged writes of one request.
///
/// Staged writes shadow stored records by id, so checks against the
/// post-image see the world as it would look after the batch commits.
pub struct Snapshot<'a> {
    store: &'a ResourceStore,
    overlay: Vec<Resource>,
}

impl<'a> Snapshot<'a> {
    pub fn new(store: &'a ResourceStore) -> Self {
        Self {
            store,
            overlay: Vec::new(),
        }
    }

    pub fn with_overlay(store: &'a ResourceStore, writes: &[Resource]) -> Self {
        Self {
            store,
            overlay: writes.to_vec(),
        }
    }

    /// Fetch by id, overlay first. `None` for records that do not exist at
    /// all; soft-deleted records are returned with `deleted_at` populated.
    pub fn get(&self, id: &str) -> Result<Option<Resource>, CoreError> {
        if let Some(r) = self.overlay.iter().find(|r| r.id == *id) {
            return Ok(Some(r.clone()));
        }
        match self.store.get(id) {
            Ok(r) => Ok(Some(r)),
            Err(gavel_store::StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List records matching the filter, with staged writes shadowing the store.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, CoreError> {
        let everything = ListFilter {
            include_deleted: true,
            ..ListFilter::default()
        };
        let mut by_id: BTreeMap<ResourceId, Resource> = self
            .store
            .list(&everything)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        for r in &self.overlay {
            by_id.insert(r.id.clone(), r.clone());
        }
        Ok(by_id
            .into_values()
            .filter(|r| filter.matches(r))
            .collect())
    }

    fn live_components_of(&self, design_id: &ResourceId) -> Result<Vec<Resource>, CoreError> {
        self.list(&ListFilter {
            kind: Some(ResourceKind::Component),
            design_id: Some(design_id.clone()),
            include_deleted: false,
        })
    }

    fn live_tests_of(&self, design_id: &ResourceId) -> Result<Vec<Resource>, CoreError> {
        self.list(&ListFilter {
            kind: Some(ResourceKind::Test),
            design_id: Some(design_id.clone()),
            include_deleted: false,
        })
    }
}

/// The capacity and wingspan units must have a conversion path within their
/// dimension. A zero-component design would otherwise hide an unknown
/// capacity unit until the first component arrives.
pub fn check_design_units(design: &DesignSpec) -> Vec<Violation> {
    let mut violations = Vec::new();
    if convert(1.0, &design.capacity.unit, "kg", Dimension::Mass).is_err() {
        violations.push(Violation::new(
            rules::UNCONVERTIBLE_UNITS,
            ViolationClass::Unit,
            Some("capacity.unit"),
            format!("'{}' is not a known mass unit", design.capacity.unit),
        ));
    }
    if let Some(wingspan) = &design.wingspan {
        if convert(1.0, &wingspan.unit, "m", Dimension::Length).is_err() {
            violations.push(Violation::new(
                rules::UNCONVERTIBLE_UNITS,
                ViolationClass::Unit,
                Some("wingspan.unit"),
                format!("'{}' is not a known length unit", wingspan.unit),
            ));
        }
    }
    violations
}

/// Aggregate invariant: the weights of all non-deleted components, converted
/// into the design's capacity unit, must not exceed the capacity.
///
/// If any component weight is unconvertible the sum is meaningless, so the
/// exceeded check is skipped and only the conversion violations are reported.
pub fn check_aggregate(
    snapshot: &Snapshot<'_>,
    design_id: &ResourceId,
) -> Result<Vec<Violation>, CoreError> {
    let Some(design_record) = snapshot.get(design_id)? else {
        return Ok(Vec::new());
    };
    let Some(design) = design_record.as_design().cloned() else {
        return Ok(Vec::new());
    };
    if design_record.is_deleted() {
        return Ok(Vec::new());
    }

    let mut violations = Vec::new();
    let mut sum = 0.0_f64;
    let mut all_convertible = true;

    for record in snapshot.live_components_of(design_id)? {
        let Some(component) = record.as_component() else {
            continue;
        };
        match convert(
            component.weight.value,
            &component.weight.unit,
            &design.capacity.unit,
            Dimension::Mass,
        ) {
            Ok(converted) => sum += converted,
            Err(e) => {
                all_convertible = false;
                violations.push(Violation::new(
                    rules::UNCONVERTIBLE_UNITS,
                    ViolationClass::Unit,
                    Some("weight.unit"),
                    format!("component '{}': {e}", component.name),
                ));
            }
        }
    }

    if all_convertible && sum > design.capacity.value + EPSILON {
        violations.push(Violation::new(
            rules::CAPACITY_EXCEEDED,
            ViolationClass::Aggregate,
            Some("weight"),
            format!(
                "component weight total {sum} {unit} exceeds design capacity {cap} {unit}",
                unit = design.capacity.unit,
                cap = design.capacity.value,
            ),
        ));
    }

    Ok(violations)
}

/// Uniqueness invariant: (design, trimmed name, classification) must be
/// distinct among non-deleted components. Names are compared
/// case-insensitively; the same name under a different classification is fine.
pub fn check_uniqueness(
    snapshot: &Snapshot<'_>,
    design_id: &ResourceId,
) -> Result<Vec<Violation>, CoreError> {
    let mut seen: BTreeMap<(String, String), u32> = BTreeMap::new();
    for record in snapshot.live_components_of(design_id)? {
        let Some(component) = record.as_component() else {
            continue;
        };
        let key = (
            component.name.trim().to_lowercase(),
            component.classification.to_string(),
        );
        *seen.entry(key).or_insert(0) += 1;
    }

    let mut violations = Vec::new();
    for ((name, classification), count) in seen {
        if count > 1 {
            violations.push(Violation::new(
                rules::DUPLICATE_COMPONENT,
                ViolationClass::Uniqueness,
                Some("name"),
                format!(
                    "component name '{name}' is already used under this design \
                     for classification {classification}"
                ),
            ));
        }
    }
    Ok(violations)
}

/// Reciprocal readiness for approval: every non-deleted test attached to the
/// design must be completed with a passing outcome, and the design's
/// description must be non-empty at that moment.
pub fn check_readiness(
    snapshot: &Snapshot<'_>,
    design_id: &ResourceId,
    design: &DesignSpec,
) -> Result<Vec<Violation>, CoreError> {
    let mut violations = Vec::new();

    for record in snapshot.live_tests_of(design_id)? {
        let Some(test) = record.as_test() else {
            continue;
        };
        if !test.status.is_terminal() {
            violations.push(Violation::new(
                rules::TESTS_INCOMPLETE,
                ViolationClass::Conflict,
                None,
                format!("test '{}' is still {}", test.name, test.status),
            ));
        } else if test.outcome != Some(TestOutcome::Pass) {
            violations.push(Violation::new(
                rules::TESTS_INCOMPLETE,
                ViolationClass::Conflict,
                None,
                format!("test '{}' completed without a passing outcome", test.name),
            ));
        }
    }

    if design
        .description
        .as_deref()
        .map_or(true, |s| s.trim().is_empty())
    {
        violations.push(Violation::new(
            rules::DESCRIPTION_REQUIRED,
            ViolationClass::Conflict,
            Some("description"),
            "description must be non-empty to approve a design",
        ));
    }

    Ok(violations)
}

/// Gate applied to a component or test mutation against its referenced design.
///
/// A deleted design is a dangling reference; a rejected design refuses new
/// records; an approved design freezes everything attached to it.
pub fn design_gate(design_record: &Resource, is_create: bool) -> Vec<Violation> {
    let mut violations = Vec::new();
    let Some(design) = design_record.as_design() else {
        violations.push(Violation::new(
            rules::TARGET_KIND,
            ViolationClass::Reference,
            Some("design_id"),
            format!("resource '{}' is not a design", design_record.id),
        ));
        return violations;
    };

    if design_record.is_deleted() {
        violations.push(Violation::new(
            rules::DESIGN_DELETED,
            ViolationClass::Reference,
            Some("design_id"),
            format!("design '{}' is deleted", design_record.id),
        ));
        return violations;
    }

    match design.status {
        DesignStatus::Draft => {}
        DesignStatus::Rejected => {
            if is_create {
                violations.push(Violation::new(
                    rules::DESIGN_STATUS,
                    ViolationClass::Conflict,
                    Some("design_id"),
                    format!("design '{}' is rejected and cannot accept new records", design_record.id),
                ));
            }
        }
        DesignStatus::Approved | DesignStatus::Completed => {
            violations.push(Violation::new(
                rules::DESIGN_STATUS,
                ViolationClass::Conflict,
                Some("design_id"),
                format!(
                    "design '{}' is {} and its records are frozen",
                    design_record.id, design.status
                ),
            ));
        }
    }
    violations
}

/// Re-validate the post-image invariants for every design touched by a write
/// batch. Cascades must never leave the store in a violating state.
pub fn verify_post_image(
    snapshot: &Snapshot<'_>,
    design_ids: &[ResourceId],
) -> Result<Vec<Violation>, CoreError> {
    let mut violations = Vec::new();
    for design_id in design_ids {
        violations.extend(check_aggregate(snapshot, design_id)?);
        violations.extend(check_uniqueness(snapshot, design_id)?);
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_schema::{
        ComponentClass, ComponentSpec, Metadata, Quantity, ResourceBody, TestCategory, TestSpec,
        TestStatus,
    };
    use gavel_store::StoreLayout;

    fn test_store() -> (tempfile::TempDir, ResourceStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, ResourceStore::new(layout))
    }

    fn design(id: &str, capacity: f64, unit: &str) -> Resource {
        Resource {
            id: ResourceId::new(id),
            body: ResourceBody::Design(DesignSpec {
                name: "wing".to_owned(),
                status: DesignStatus::Draft,
                revision: 1,
                description: Some("high aspect ratio wing".to_owned()),
                capacity: Quantity::new(capacity, unit),
                wingspan: None,
            }),
            meta: Metadata::new("2025-01-01T00:00:00Z"),
            checksum: None,
        }
    }

    fn component(id: &str, design: &str, name: &str, weight: f64, unit: &str) -> Resource {
        Resource {
            id: ResourceId::new(id),
            body: ResourceBody::Component(ComponentSpec {
                design_id: Some(ResourceId::new(design)),
                name: name.to_owned(),
                classification: ComponentClass::Structural,
                weight: Quantity::new(weight, unit),
            }),
            meta: Metadata::new("2025-01-01T00:00:00Z"),
            checksum: None,
        }
    }

    fn test_record(id: &str, design: &str, status: TestStatus, outcome: Option<TestOutcome>) -> Resource {
        Resource {
            id: ResourceId::new(id),
            body: ResourceBody::Test(TestSpec {
                design_id: ResourceId::new(design),
                name: format!("test {id}"),
                category: TestCategory::Structural,
                status,
                outcome,
            }),
            meta: Metadata::new("2025-01-01T00:00:00Z"),
            checksum: None,
        }
    }

    #[test]
    fn aggregate_within_capacity_is_satisfied() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 5200.0, "kg")).unwrap();

        let snap = Snapshot::new(&store);
        let violations = check_aggregate(&snap, &ResourceId::new("d1")).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn aggregate_over_capacity_is_violated() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 5200.0, "kg")).unwrap();
        store.put(&component("c2", "d1", "engine", 38000.0, "kg")).unwrap();

        let snap = Snapshot::new(&store);
        let violations = check_aggregate(&snap, &ResourceId::new("d1")).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::CAPACITY_EXCEEDED);
        assert_eq!(violations[0].class, ViolationClass::Aggregate);
    }

    #[test]
    fn aggregate_converts_units_before_summing() {
        let (_dir, store) = test_store();
        // 2 t capacity, components expressed in kg and g.
        store.put(&design("d1", 2.0, "t")).unwrap();
        store.put(&component("c1", "d1", "spar", 1500.0, "kg")).unwrap();
        store.put(&component("c2", "d1", "bolt", 400_000.0, "g")).unwrap();

        let snap = Snapshot::new(&store);
        assert!(check_aggregate(&snap, &ResourceId::new("d1")).unwrap().is_empty());

        // One more gram bundle pushes it over 2 t.
        store.put(&component("c3", "d1", "rivet", 200_000.0, "g")).unwrap();
        let violations = check_aggregate(&snap, &ResourceId::new("d1")).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::CAPACITY_EXCEEDED);
    }

    #[test]
    fn aggregate_excludes_soft_deleted_components() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        let mut c1 = component("c1", "d1", "spar", 40000.0, "kg");
        c1.meta.deleted_at = Some("2025-02-01T00:00:00Z".to_owned());
        store.put(&c1).unwrap();
        store.put(&component("c2", "d1", "engine", 38000.0, "kg")).unwrap();

        let snap = Snapshot::new(&store);
        assert!(check_aggregate(&snap, &ResourceId::new("d1")).unwrap().is_empty());
    }

    #[test]
    fn unconvertible_component_reports_and_skips_sum() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 100.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 90.0, "kg")).unwrap();
        store.put(&component("c2", "d1", "mystery", 90.0, "cubit")).unwrap();

        let snap = Snapshot::new(&store);
        let violations = check_aggregate(&snap, &ResourceId::new("d1")).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::UNCONVERTIBLE_UNITS);
        assert_eq!(violations[0].class.http_status(), 422);
    }

    #[test]
    fn overlay_shadows_stored_records() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 5200.0, "kg")).unwrap();

        // Staged update raises c1's weight past capacity.
        let staged = component("c1", "d1", "spar", 43000.0, "kg");
        let snap = Snapshot::with_overlay(&store, &[staged]);
        let violations = check_aggregate(&snap, &ResourceId::new("d1")).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::CAPACITY_EXCEEDED);
    }

    #[test]
    fn uniqueness_rejects_same_name_same_class() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 100.0, "kg")).unwrap();
        store.put(&component("c2", "d1", " Spar ", 100.0, "kg")).unwrap();

        let snap = Snapshot::new(&store);
        let violations = check_uniqueness(&snap, &ResourceId::new("d1")).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::DUPLICATE_COMPONENT);
    }

    #[test]
    fn uniqueness_allows_same_name_across_classifications() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "mount", 100.0, "kg")).unwrap();
        let mut c2 = component("c2", "d1", "mount", 100.0, "kg");
        if let ResourceBody::Component(c) = &mut c2.body {
            c.classification = ComponentClass::Avionics;
        }
        store.put(&c2).unwrap();

        let snap = Snapshot::new(&store);
        assert!(check_uniqueness(&snap, &ResourceId::new("d1")).unwrap().is_empty());
    }

    #[test]
    fn uniqueness_ignores_deleted_components() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 42500.0, "kg")).unwrap();
        let mut c1 = component("c1", "d1", "spar", 100.0, "kg");
        c1.meta.deleted_at = Some("2025-02-01T00:00:00Z".to_owned());
        store.put(&c1).unwrap();
        store.put(&component("c2", "d1", "spar", 100.0, "kg")).unwrap();

        let snap = Snapshot::new(&store);
        assert!(check_uniqueness(&snap, &ResourceId::new("d1")).unwrap().is_empty());
    }

    #[test]
    fn readiness_requires_all_tests_passing() {
        let (_dir, store) = test_store();
        let d = design("d1", 42500.0, "kg");
        store.put(&d).unwrap();
        store
            .put(&test_record("t1", "d1", TestStatus::Planned, None))
            .unwrap();

        let snap = Snapshot::new(&store);
        let spec = d.as_design().unwrap();
        let violations = check_readiness(&snap, &ResourceId::new("d1"), spec).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::TESTS_INCOMPLETE);
        assert!(violations[0].message.contains("planned"));
    }

    #[test]
    fn readiness_rejects_failing_outcome() {
        let (_dir, store) = test_store();
        let d = design("d1", 42500.0, "kg");
        store.put(&d).unwrap();
        store
            .put(&test_record("t1", "d1", TestStatus::Completed, Some(TestOutcome::Fail)))
            .unwrap();

        let snap = Snapshot::new(&store);
        let violations =
            check_readiness(&snap, &ResourceId::new("d1"), d.as_design().unwrap()).unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("without a passing outcome"));
    }

    #[test]
    fn readiness_ignores_deleted_tests() {
        let (_dir, store) = test_store();
        let d = design("d1", 42500.0, "kg");
        store.put(&d).unwrap();
        let mut t = test_record("t1", "d1", TestStatus::Planned, None);
        t.meta.deleted_at = Some("2025-02-01T00:00:00Z".to_owned());
        store.put(&t).unwrap();

        let snap = Snapshot::new(&store);
        assert!(
            check_readiness(&snap, &ResourceId::new("d1"), d.as_design().unwrap())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn readiness_requires_description() {
        let (_dir, store) = test_store();
        let mut d = design("d1", 42500.0, "kg");
        if let ResourceBody::Design(spec) = &mut d.body {
            spec.description = Some("   ".to_owned());
        }
        store.put(&d).unwrap();

        let snap = Snapshot::new(&store);
        let violations =
            check_readiness(&snap, &ResourceId::new("d1"), d.as_design().unwrap()).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::DESCRIPTION_REQUIRED);
    }

    #[test]
    fn design_gate_states() {
        let mut d = design("d1", 42500.0, "kg");

        assert!(design_gate(&d, true).is_empty());
        assert!(design_gate(&d, false).is_empty());

        if let ResourceBody::Design(spec) = &mut d.body {
            spec.status = DesignStatus::Rejected;
        }
        assert_eq!(design_gate(&d, true).len(), 1);
        assert!(design_gate(&d, false).is_empty());

        if let ResourceBody::Design(spec) = &mut d.body {
            spec.status = DesignStatus::Approved;
        }
        assert_eq!(design_gate(&d, true).len(), 1);
        assert_eq!(design_gate(&d, false).len(), 1);
    }

    #[test]
    fn design_gate_deleted_is_dangling_reference() {
        let mut d = design("d1", 42500.0, "kg");
        d.meta.deleted_at = Some("2025-02-01T00:00:00Z".to_owned());
        let violations = design_gate(&d, false);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::DESIGN_DELETED);
        assert_eq!(violations[0].class.http_status(), 404);
    }

    #[test]
    fn design_gate_rejects_wrong_kind() {
        let c = component("c1", "d1", "spar", 1.0, "kg");
        let violations = design_gate(&c, true);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::TARGET_KIND);
    }

    #[test]
    fn unknown_capacity_unit_flagged_even_without_components() {
        let d = DesignSpec {
            name: "wing".to_owned(),
            status: DesignStatus::Draft,
            revision: 1,
            description: None,
            capacity: Quantity::new(100.0, "cubit"),
            wingspan: Some(Quantity::new(35.8, "m")),
        };
        let violations = check_design_units(&d);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("capacity.unit"));
    }

    #[test]
    fn wingspan_must_be_a_length_unit() {
        let d = DesignSpec {
            name: "wing".to_owned(),
            status: DesignStatus::Draft,
            revision: 1,
            description: None,
            capacity: Quantity::new(100.0, "kg"),
            wingspan: Some(Quantity::new(35.8, "kg")),
        };
        let violations = check_design_units(&d);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field.as_deref(), Some("wingspan.unit"));
    }

    #[test]
    fn verify_post_image_covers_touched_designs() {
        let (_dir, store) = test_store();
        store.put(&design("d1", 100.0, "kg")).unwrap();
        store.put(&component("c1", "d1", "spar", 90.0, "kg")).unwrap();

        let staged = component("c2", "d1", "engine", 50.0, "kg");
        let snap = Snapshot::with_overlay(&store, &[staged]);
        let violations = verify_post_image(&snap, &[ResourceId::new("d1")]).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, rules::CAPACITY_EXCEEDED);
    }
}
