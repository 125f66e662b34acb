//! The rule evaluation engine.
//!
//! One entry point for every state-changing request: the engine runs the
//! field validator, the transition tables, and the cross-resource checks,
//! computes the full write batch (primary record plus cascades), and commits
//! it through the journal as one atomic unit. Reads during evaluation happen
//! under the store lock, so each request observes one consistent snapshot.
//!
//! Field errors abort the evaluation early: the later stages assume a
//! structurally well-formed payload. All other stages collect every
//! violation before rejecting.

use crate::audit::{AuditEntry, AuditOutcome, AuditSink};
use crate::cascade::compute_design_delete;
use crate::clock::Clock;
use crate::consistency::{
    check_design_units, check_readiness, design_gate, verify_post_image, Snapshot,
};
use crate::lifecycle::{validate_transition, DESIGN_TRANSITIONS, TEST_TRANSITIONS};
use crate::violation::{rules, Evaluation, Violation, ViolationClass};
use crate::CoreError;
use chrono::{DateTime, Utc};
use gavel_schema::{
    validate::{
        validate_component_create, validate_component_patch, validate_design_create,
        validate_design_patch, validate_outcome_presence, validate_test_create,
        validate_test_patch,
    },
    ComponentPayload, ComponentSpec, DesignPayload, DesignSpec, DesignStatus, FieldError,
    Metadata, MutationRequest, OpId, Operation, Payload, Resource, ResourceBody, ResourceId,
    ResourceKind, TestPayload, TestSpec, TestStatus,
};
use gavel_store::{
    CommitJournal, ListFilter, ResourceStore, StoreError, StoreLayout, StoreLock,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub struct Engine {
    layout: StoreLayout,
    store: ResourceStore,
    journal: CommitJournal,
    clock: Box<dyn Clock>,
    audit: Box<dyn AuditSink>,
    op_seq: AtomicU64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Open an initialized store.
    ///
    /// If no other process holds the store lock, incomplete journal entries
    /// left by a crash are rolled back before the engine accepts requests. A
    /// held lock means a live writer owns those entries.
    pub fn open(
        root: &Path,
        clock: Box<dyn Clock>,
        audit: Box<dyn AuditSink>,
    ) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(root);
        layout.verify_version()?;
        let store = ResourceStore::new(layout.clone());
        let journal = CommitJournal::new(&layout);

        if let Some(_guard) = StoreLock::try_acquire(&layout.lock_file())? {
            let rolled_back = journal.recover()?;
            if rolled_back > 0 {
                info!("rolled back {rolled_back} incomplete batch(es) on startup");
            }
        }

        Ok(Self {
            layout,
            store,
            journal,
            clock,
            audit,
            op_seq: AtomicU64::new(0),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Evaluate a request without committing anything. Takes the store lock
    /// for the duration so the reads form one consistent snapshot.
    pub fn evaluate(&self, request: &MutationRequest) -> Result<Evaluation, CoreError> {
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        self.evaluate_locked(request)
    }

    /// Evaluate a request and, if accepted, commit its full write batch
    /// atomically. Every submission is reported to the audit sink, including
    /// ones that fail with an internal error.
    pub fn submit(&self, request: &MutationRequest) -> Result<Evaluation, CoreError> {
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        let now = self.clock.now();
        let op_id = self.mint_op_id(&now);

        let evaluation = match self.evaluate_locked(request) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                self.record_audit(&op_id, &now, request, AuditOutcome::Error, &[], None);
                return Err(e);
            }
        };

        match &evaluation {
            Evaluation::Accepted { writes } => {
                if let Err(e) = self.journal.commit(&op_id, writes, &self.store) {
                    self.record_audit(&op_id, &now, request, AuditOutcome::Error, &[], None);
                    return Err(e.into());
                }
                let primary = writes.first().map(|w| w.id.clone());
                self.record_audit(&op_id, &now, request, AuditOutcome::Accepted, &[], primary);
            }
            Evaluation::Rejected { violations } => {
                self.record_audit(
                    &op_id,
                    &now,
                    request,
                    AuditOutcome::Rejected,
                    violations,
                    request.id.clone(),
                );
            }
        }
        Ok(evaluation)
    }

    /// Fetch one record. Soft-deleted records are hidden unless asked for.
    pub fn get_resource(
        &self,
        id: &str,
        include_deleted: bool,
    ) -> Result<Option<Resource>, CoreError> {
        match self.store.get(id) {
            Ok(r) if r.is_deleted() && !include_deleted => Ok(None),
            Ok(r) => Ok(Some(r)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Resource>, CoreError> {
        Ok(self.store.list(filter)?)
    }

    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>, CoreError> {
        Ok(crate::audit::read_audit_log(self.layout.audit_log_path())?)
    }

    fn record_audit(
        &self,
        op_id: &OpId,
        now: &DateTime<Utc>,
        request: &MutationRequest,
        outcome: AuditOutcome,
        violations: &[Violation],
        resource_id: Option<ResourceId>,
    ) {
        self.audit.record(&AuditEntry {
            op_id: op_id.clone(),
            timestamp: now.to_rfc3339(),
            operation: request.operation,
            kind: request.kind,
            resource_id: resource_id.or_else(|| request.id.clone()),
            outcome,
            violations: violations.to_vec(),
        });
    }

    fn evaluate_locked(&self, request: &MutationRequest) -> Result<Evaluation, CoreError> {
        let now = self.clock.now().to_rfc3339();
        match (request.operation, &request.payload) {
            (Operation::Create, Payload::Design(p)) => self.design_create(p, &now),
            (Operation::Update, Payload::Design(p)) => {
                self.design_update(self.target_id(request)?, p, &now)
            }
            (Operation::Create, Payload::Component(p)) => self.component_create(p, &now),
            (Operation::Update, Payload::Component(p)) => {
                self.component_update(self.target_id(request)?, p, &now)
            }
            (Operation::Create, Payload::Test(p)) => self.test_create(p, &now),
            (Operation::Update, Payload::Test(p)) => {
                self.test_update(self.target_id(request)?, p, &now)
            }
            (Operation::Delete, Payload::None) => {
                self.delete(self.target_id(request)?, request.kind, &now)
            }
            _ => Err(CoreError::MalformedRequest(format!(
                "operation '{}' with mismatched payload",
                request.operation
            ))),
        }
    }

    fn target_id<'r>(&self, request: &'r MutationRequest) -> Result<&'r ResourceId, CoreError> {
        request.id.as_ref().ok_or_else(|| {
            CoreError::MalformedRequest(format!("operation '{}' requires an id", request.operation))
        })
    }

    /// Fetch the target of an update or delete. Missing and already-deleted
    /// targets are rejections, not errors.
    fn fetch_target(&self, id: &ResourceId) -> Result<Result<Resource, Evaluation>, CoreError> {
        match self.store.get(id) {
            Ok(r) if r.is_deleted() => Ok(Err(reject_one(Violation::new(
                rules::DELETED_IMMUTABLE,
                ViolationClass::Conflict,
                None,
                format!("resource '{id}' is deleted and immutable"),
            )))),
            Ok(r) => Ok(Ok(r)),
            Err(StoreError::NotFound(_)) => Ok(Err(reject_one(Violation::new(
                rules::TARGET_MISSING,
                ViolationClass::Reference,
                None,
                format!("resource '{id}' does not exist"),
            )))),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the design a component or test references. A missing design is
    /// a dangling reference; deletion and status gating is `design_gate`'s job.
    fn fetch_design(
        &self,
        design_id: &ResourceId,
    ) -> Result<Result<Resource, Violation>, CoreError> {
        match self.store.get(design_id) {
            Ok(r) => Ok(Ok(r)),
            Err(StoreError::NotFound(_)) => Ok(Err(Violation::new(
                rules::DESIGN_MISSING,
                ViolationClass::Reference,
                Some("design_id"),
                format!("design '{design_id}' does not exist"),
            ))),
            Err(e) => Err(e.into()),
        }
    }

    // ---- designs ----

    fn design_create(&self, p: &DesignPayload, now: &str) -> Result<Evaluation, CoreError> {
        let field_errors = validate_design_create(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }
        let (Some(name), Some(capacity)) = (&p.name, &p.capacity) else {
            return Err(CoreError::MalformedRequest(
                "design create payload missing required fields after validation".to_owned(),
            ));
        };

        let spec = DesignSpec {
            name: name.trim().to_owned(),
            status: DesignStatus::Draft,
            revision: 1,
            description: normalize_description(p.description.as_deref()),
            capacity: capacity.clone(),
            wingspan: p.wingspan.clone(),
        };

        let violations = check_design_units(&spec);
        if !violations.is_empty() {
            return Ok(Evaluation::Rejected { violations });
        }

        let id = self.mint_resource_id(ResourceKind::Design, &spec.name, now);
        Ok(Evaluation::Accepted {
            writes: vec![Resource {
                id,
                body: ResourceBody::Design(spec),
                meta: Metadata::new(now),
                checksum: None,
            }],
        })
    }

    fn design_update(
        &self,
        id: &ResourceId,
        p: &DesignPayload,
        now: &str,
    ) -> Result<Evaluation, CoreError> {
        let target = match self.fetch_target(id)? {
            Ok(r) => r,
            Err(rejection) => return Ok(rejection),
        };
        let Some(current) = target.as_design().cloned() else {
            return Ok(reject_one(not_a(id, "design")));
        };

        let field_errors = validate_design_patch(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }

        let mut violations = Vec::new();
        let mut updated = current.clone();
        let mut spec_changed = false;
        let frozen = current.status.is_approved_or_later();

        let freeze = |field: &str, violations: &mut Vec<Violation>| {
            violations.push(Violation::new(
                rules::DESIGN_FROZEN,
                ViolationClass::Conflict,
                Some(field),
                format!("design '{id}' is {} and its specification is frozen", current.status),
            ));
        };

        if let Some(name) = &p.name {
            if frozen {
                freeze("name", &mut violations);
            } else if name.trim() != updated.name {
                updated.name = name.trim().to_owned();
                spec_changed = true;
            }
        }
        if let Some(description) = &p.description {
            if frozen {
                freeze("description", &mut violations);
            } else {
                let normalized = normalize_description(Some(description.as_str()));
                if normalized != updated.description {
                    updated.description = normalized;
                    spec_changed = true;
                }
            }
        }
        if let Some(capacity) = &p.capacity {
            if frozen {
                freeze("capacity", &mut violations);
            } else if *capacity != updated.capacity {
                updated.capacity = capacity.clone();
                spec_changed = true;
            }
        }
        if let Some(wingspan) = &p.wingspan {
            if frozen {
                freeze("wingspan", &mut violations);
            } else if Some(wingspan) != updated.wingspan.as_ref() {
                updated.wingspan = Some(wingspan.clone());
                spec_changed = true;
            }
        }

        if let Some(new_status) = p.status {
            match validate_transition(DESIGN_TRANSITIONS, current.status, new_status) {
                Ok(()) => updated.status = new_status,
                Err(v) => violations.push(v),
            }
        }

        if spec_changed {
            updated.revision = current.revision + 1;
            violations.extend(check_design_units(&updated));
        }

        if updated.status == DesignStatus::Approved && current.status != DesignStatus::Approved {
            let snapshot = Snapshot::new(&self.store);
            violations.extend(check_readiness(&snapshot, id, &updated)?);
        }

        let write = Resource {
            id: id.clone(),
            body: ResourceBody::Design(updated),
            meta: Metadata {
                created_at: target.meta.created_at.clone(),
                updated_at: now.to_owned(),
                deleted_at: None,
            },
            checksum: None,
        };

        // A capacity change can strand the existing components over the new
        // limit, so the invariants are re-checked against the post-image.
        if spec_changed {
            let snapshot = Snapshot::with_overlay(&self.store, std::slice::from_ref(&write));
            violations.extend(verify_post_image(&snapshot, std::slice::from_ref(id))?);
        }

        if violations.is_empty() {
            Ok(Evaluation::Accepted {
                writes: vec![write],
            })
        } else {
            Ok(Evaluation::Rejected { violations })
        }
    }

    // ---- components ----

    fn component_create(&self, p: &ComponentPayload, now: &str) -> Result<Evaluation, CoreError> {
        let field_errors = validate_component_create(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }
        let (Some(design_id), Some(name), Some(classification), Some(weight)) =
            (&p.design_id, &p.name, p.classification, &p.weight)
        else {
            return Err(CoreError::MalformedRequest(
                "component create payload missing required fields after validation".to_owned(),
            ));
        };

        let mut violations = Vec::new();
        match self.fetch_design(design_id)? {
            Ok(design) => violations.extend(design_gate(&design, true)),
            Err(v) => violations.push(v),
        }
        if !violations.is_empty() {
            return Ok(Evaluation::Rejected { violations });
        }

        let spec = ComponentSpec {
            design_id: Some(design_id.clone()),
            name: name.trim().to_owned(),
            classification,
            weight: weight.clone(),
        };
        let write = Resource {
            id: self.mint_resource_id(ResourceKind::Component, &spec.name, now),
            body: ResourceBody::Component(spec),
            meta: Metadata::new(now),
            checksum: None,
        };

        let snapshot = Snapshot::with_overlay(&self.store, std::slice::from_ref(&write));
        violations.extend(verify_post_image(&snapshot, std::slice::from_ref(design_id))?);

        if violations.is_empty() {
            Ok(Evaluation::Accepted {
                writes: vec![write],
            })
        } else {
            Ok(Evaluation::Rejected { violations })
        }
    }

    fn component_update(
        &self,
        id: &ResourceId,
        p: &ComponentPayload,
        now: &str,
    ) -> Result<Evaluation, CoreError> {
        let target = match self.fetch_target(id)? {
            Ok(r) => r,
            Err(rejection) => return Ok(rejection),
        };
        let Some(current) = target.as_component().cloned() else {
            return Ok(reject_one(not_a(id, "component")));
        };

        let field_errors = validate_component_patch(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }

        let mut violations = Vec::new();
        if let Some(design_id) = &current.design_id {
            match self.fetch_design(design_id)? {
                Ok(design) => violations.extend(design_gate(&design, false)),
                Err(v) => violations.push(v),
            }
        }

        let mut updated = current.clone();
        if let Some(name) = &p.name {
            updated.name = name.trim().to_owned();
        }
        if let Some(classification) = p.classification {
            updated.classification = classification;
        }
        if let Some(weight) = &p.weight {
            updated.weight = weight.clone();
        }

        let write = Resource {
            id: id.clone(),
            body: ResourceBody::Component(updated),
            meta: Metadata {
                created_at: target.meta.created_at.clone(),
                updated_at: now.to_owned(),
                deleted_at: None,
            },
            checksum: None,
        };

        if let Some(design_id) = &current.design_id {
            let snapshot = Snapshot::with_overlay(&self.store, std::slice::from_ref(&write));
            violations.extend(verify_post_image(&snapshot, std::slice::from_ref(design_id))?);
        }

        if violations.is_empty() {
            Ok(Evaluation::Accepted {
                writes: vec![write],
            })
        } else {
            Ok(Evaluation::Rejected { violations })
        }
    }

    // ---- tests ----

    fn test_create(&self, p: &TestPayload, now: &str) -> Result<Evaluation, CoreError> {
        let field_errors = validate_test_create(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }
        let (Some(design_id), Some(name), Some(category)) = (&p.design_id, &p.name, p.category)
        else {
            return Err(CoreError::MalformedRequest(
                "test create payload missing required fields after validation".to_owned(),
            ));
        };

        let mut violations = Vec::new();
        match self.fetch_design(design_id)? {
            Ok(design) => violations.extend(design_gate(&design, true)),
            Err(v) => violations.push(v),
        }
        if !violations.is_empty() {
            return Ok(Evaluation::Rejected { violations });
        }

        let spec = TestSpec {
            design_id: design_id.clone(),
            name: name.trim().to_owned(),
            category,
            status: TestStatus::Planned,
            outcome: None,
        };
        Ok(Evaluation::Accepted {
            writes: vec![Resource {
                id: self.mint_resource_id(ResourceKind::Test, &spec.name, now),
                body: ResourceBody::Test(spec),
                meta: Metadata::new(now),
                checksum: None,
            }],
        })
    }

    fn test_update(
        &self,
        id: &ResourceId,
        p: &TestPayload,
        now: &str,
    ) -> Result<Evaluation, CoreError> {
        let target = match self.fetch_target(id)? {
            Ok(r) => r,
            Err(rejection) => return Ok(rejection),
        };
        let Some(current) = target.as_test().cloned() else {
            return Ok(reject_one(not_a(id, "test")));
        };

        let field_errors = validate_test_patch(p);
        if !field_errors.is_empty() {
            return Ok(reject_fields(&field_errors));
        }

        let mut violations = Vec::new();
        match self.fetch_design(&current.design_id)? {
            Ok(design) => violations.extend(design_gate(&design, false)),
            Err(v) => violations.push(v),
        }

        let terminal = current.status.is_terminal();
        let mut updated = current.clone();

        if let Some(name) = &p.name {
            // The name stays editable after completion; only the recorded
            // measurement is frozen.
            updated.name = name.trim().to_owned();
        }
        if let Some(category) = p.category {
            if terminal {
                violations.push(terminal_field(id, "category"));
            } else {
                updated.category = category;
            }
        }
        if let Some(new_status) = p.status {
            match validate_transition(TEST_TRANSITIONS, current.status, new_status) {
                Ok(()) => updated.status = new_status,
                Err(v) => violations.push(v),
            }
        }
        if let Some(outcome) = p.outcome {
            if terminal {
                violations.push(terminal_field(id, "outcome"));
            } else {
                updated.outcome = Some(outcome);
            }
        }

        violations.extend(
            validate_outcome_presence(updated.status, updated.outcome)
                .iter()
                .map(Violation::from_field),
        );

        if !violations.is_empty() {
            return Ok(Evaluation::Rejected { violations });
        }
        Ok(Evaluation::Accepted {
            writes: vec![Resource {
                id: id.clone(),
                body: ResourceBody::Test(updated),
                meta: Metadata {
                    created_at: target.meta.created_at.clone(),
                    updated_at: now.to_owned(),
                    deleted_at: None,
                },
                checksum: None,
            }],
        })
    }

    // ---- deletes ----

    fn delete(
        &self,
        id: &ResourceId,
        kind: ResourceKind,
        now: &str,
    ) -> Result<Evaluation, CoreError> {
        let target = match self.fetch_target(id)? {
            Ok(r) => r,
            Err(rejection) => return Ok(rejection),
        };
        if target.kind() != kind {
            return Ok(reject_one(not_a(id, kind.as_str())));
        }

        match target.kind() {
            ResourceKind::Design => {
                let snapshot = Snapshot::new(&self.store);
                compute_design_delete(&snapshot, &target, now)
            }
            ResourceKind::Component | ResourceKind::Test => {
                let mut violations = Vec::new();
                if let Some(design_id) = target.design_ref().cloned() {
                    match self.fetch_design(&design_id)? {
                        Ok(design) => violations.extend(design_gate(&design, false)),
                        Err(v) => violations.push(v),
                    }
                }
                let mut deleted = target.clone();
                deleted.meta.updated_at = now.to_owned();
                deleted.meta.deleted_at = Some(now.to_owned());
                deleted.checksum = None;

                if let Some(design_id) = target.design_ref() {
                    let snapshot =
                        Snapshot::with_overlay(&self.store, std::slice::from_ref(&deleted));
                    violations.extend(verify_post_image(&snapshot, std::slice::from_ref(design_id))?);
                }

                if !violations.is_empty() {
                    return Ok(Evaluation::Rejected { violations });
                }
                Ok(Evaluation::Accepted {
                    writes: vec![deleted],
                })
            }
        }
    }

    // ---- id minting ----

    fn mint_op_id(&self, now: &DateTime<Utc>) -> OpId {
        let seq = self.op_seq.fetch_add(1, Ordering::Relaxed);
        let digest = blake3::hash(format!("{}:{seq}", now.to_rfc3339()).as_bytes());
        let hex = digest.to_hex();
        OpId::new(format!(
            "{}-{}",
            now.format("%Y%m%dT%H%M%SZ"),
            &hex.as_str()[..8]
        ))
    }

    /// Content-derived ids: a blake3 prefix over kind, name, and mint time,
    /// salted with a counter on the (unlikely) prefix collision.
    fn mint_resource_id(&self, kind: ResourceKind, name: &str, now: &str) -> ResourceId {
        let mut counter = 0u64;
        loop {
            let digest = blake3::hash(format!("{kind}:{name}:{now}:{counter}").as_bytes());
            let hex = digest.to_hex();
            let id = &hex.as_str()[..16];
            if !self.store.exists(id) {
                return ResourceId::new(id);
            }
            counter += 1;
        }
    }
}

fn reject_one(violation: Violation) -> Evaluation {
    Evaluation::Rejected {
        violations: vec![violation],
    }
}

fn reject_fields(errors: &[FieldError]) -> Evaluation {
    Evaluation::Rejected {
        violations: errors.iter().map(Violation::from_field).collect(),
    }
}

fn not_a(id: &ResourceId, kind: &str) -> Violation {
    Violation::new(
        rules::TARGET_KIND,
        ViolationClass::Reference,
        None,
        format!("resource '{id}' is not a {kind}"),
    )
}

fn terminal_field(id: &ResourceId, field: &str) -> Violation {
    Violation::new(
        rules::TERMINAL_FIELD,
        ViolationClass::Conflict,
        Some(field),
        format!("test '{id}' is completed; {field} is immutable"),
    )
}

fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
}
