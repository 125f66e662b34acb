//! Structured rule violations.
//!
//! A rejected mutation is a normal evaluation outcome, not an error: each
//! violated rule is reported as a [`Violation`] carrying a stable rule id,
//! a classification, and the offending field path, enough structure for an
//! orchestrator to render the documented `error_id`/`errors[]` payloads and
//! status codes without re-parsing messages.

use gavel_schema::{FieldError, FieldErrorKind, Resource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable rule identifiers carried on violations.
pub mod rules {
    pub const FIELD_REQUIRED: &str = "field.required";
    pub const FIELD_LENGTH: &str = "field.length";
    pub const FIELD_RANGE: &str = "field.range";
    pub const FIELD_REQUIRED_TOGETHER: &str = "field.required_together";
    pub const FIELD_FORBIDDEN: &str = "field.forbidden";
    pub const INVALID_TRANSITION: &str = "transition.invalid";
    pub const TARGET_MISSING: &str = "reference.target_missing";
    pub const TARGET_KIND: &str = "reference.kind_mismatch";
    pub const DESIGN_MISSING: &str = "reference.design_missing";
    pub const DESIGN_DELETED: &str = "reference.design_deleted";
    pub const DESIGN_STATUS: &str = "conflict.design_status";
    pub const DELETED_IMMUTABLE: &str = "conflict.deleted_immutable";
    pub const DESIGN_FROZEN: &str = "conflict.design_frozen";
    pub const TERMINAL_FIELD: &str = "conflict.terminal_field_immutable";
    pub const DELETE_BLOCKED: &str = "conflict.delete_blocked";
    pub const CAPACITY_EXCEEDED: &str = "aggregate.capacity_exceeded";
    pub const UNCONVERTIBLE_UNITS: &str = "aggregate.unconvertible_units";
    pub const DUPLICATE_COMPONENT: &str = "uniqueness.duplicate_component";
    pub const TESTS_INCOMPLETE: &str = "readiness.tests_incomplete";
    pub const DESCRIPTION_REQUIRED: &str = "readiness.description_required";
}

/// Coarse violation taxonomy, mirroring the documented error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationClass {
    /// Structural field error; recoverable by resubmission.
    Field,
    /// Illegal status change.
    Transition,
    /// Dangling reference or missing target.
    Reference,
    /// State conflict (immutability, forbidden-by-status, blocked delete).
    Conflict,
    /// Aggregate capacity exceeded.
    Aggregate,
    /// Duplicate composite key.
    Uniqueness,
    /// Cross-field semantic gap (unit missing or unconvertible).
    Unit,
}

impl ViolationClass {
    /// Status-code hint consumed by the request orchestrator.
    pub fn http_status(self) -> u16 {
        match self {
            ViolationClass::Field | ViolationClass::Transition => 400,
            ViolationClass::Reference => 404,
            ViolationClass::Conflict | ViolationClass::Aggregate | ViolationClass::Uniqueness => {
                409
            }
            ViolationClass::Unit => 422,
        }
    }
}

impl fmt::Display for ViolationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationClass::Field => "field",
            ViolationClass::Transition => "transition",
            ViolationClass::Reference => "reference",
            ViolationClass::Conflict => "conflict",
            ViolationClass::Aggregate => "aggregate",
            ViolationClass::Uniqueness => "uniqueness",
            ViolationClass::Unit => "unit",
        };
        f.write_str(s)
    }
}

/// One violated rule, scoped to a field where that makes sense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub class: ViolationClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn new(
        rule: &str,
        class: ViolationClass,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.to_owned(),
            class,
            field: field.map(str::to_owned),
            message: message.into(),
        }
    }

    /// Lift a field-validator error into a violation.
    pub fn from_field(e: &FieldError) -> Self {
        let (rule, class) = match e.kind {
            FieldErrorKind::Required => (rules::FIELD_REQUIRED, ViolationClass::Field),
            FieldErrorKind::Length => (rules::FIELD_LENGTH, ViolationClass::Field),
            FieldErrorKind::Range => (rules::FIELD_RANGE, ViolationClass::Field),
            // A quantity split from its unit is the documented 422 case.
            FieldErrorKind::RequiredTogether => {
                (rules::FIELD_REQUIRED_TOGETHER, ViolationClass::Unit)
            }
            FieldErrorKind::Forbidden => (rules::FIELD_FORBIDDEN, ViolationClass::Field),
        };
        Self::new(rule, class, Some(&e.field), e.message.clone())
    }

    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::new(
            rules::INVALID_TRANSITION,
            ViolationClass::Transition,
            Some("status"),
            format!("invalid state transition: {from} -> {to}"),
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}: {}", self.rule, field, self.message),
            None => write!(f, "[{}] {}", self.rule, self.message),
        }
    }
}

/// Outcome of evaluating one mutation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Evaluation {
    /// Every rule passed; `writes` is the full batch (primary plus cascades)
    /// to commit as one atomic unit.
    Accepted { writes: Vec<Resource> },
    /// At least one rule was violated; nothing may be written.
    Rejected { violations: Vec<Violation> },
}

impl Evaluation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Evaluation::Accepted { .. })
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Evaluation::Accepted { .. } => &[],
            Evaluation::Rejected { violations } => violations,
        }
    }
}
