//! Field-level validation of mutation payloads.
//!
//! This is the first stage of every evaluation: purely structural checks on
//! the request itself (required presence, trimmed length bounds, numeric
//! ranges, required-together pairs). All errors for a payload are collected
//! and returned together; nothing here short-circuits, reads the store, or
//! consults the unit conversion table.

use crate::request::{ComponentPayload, DesignPayload, TestPayload};
use crate::resource::{TestOutcome, TestStatus};
use crate::units::Quantity;
use serde::Serialize;

pub const NAME_MAX: usize = 120;
pub const DESCRIPTION_MAX: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    /// A required field is absent (possibly conditional on another field).
    Required,
    /// A string is empty after trimming or exceeds its length bound.
    Length,
    /// A numeric value is outside its legal range.
    Range,
    /// One half of a required-together pair is missing.
    RequiredTogether,
    /// A field is present that this operation must not set.
    Forbidden,
}

/// A single field-scoped validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.to_owned(),
            kind,
            message: message.into(),
        }
    }
}

fn require(field: &str, errors: &mut Vec<FieldError>) {
    errors.push(FieldError::new(
        field,
        FieldErrorKind::Required,
        format!("{field} is required"),
    ));
}

fn forbid(field: &str, reason: &str, errors: &mut Vec<FieldError>) {
    errors.push(FieldError::new(field, FieldErrorKind::Forbidden, reason));
}

fn check_name(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::Length,
            format!("{field} must not be blank"),
        ));
    } else if trimmed.chars().count() > NAME_MAX {
        errors.push(FieldError::new(
            field,
            FieldErrorKind::Length,
            format!("{field} must be at most {NAME_MAX} characters"),
        ));
    }
}

fn check_description(value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().chars().count() > DESCRIPTION_MAX {
        errors.push(FieldError::new(
            "description",
            FieldErrorKind::Length,
            format!("description must be at most {DESCRIPTION_MAX} characters"),
        ));
    }
}

fn check_quantity(field: &str, q: &Quantity, errors: &mut Vec<FieldError>) {
    if !q.value.is_finite() || q.value <= 0.0 {
        errors.push(FieldError::new(
            &format!("{field}.value"),
            FieldErrorKind::Range,
            format!("{field} must be a finite value greater than zero"),
        ));
    }
    if q.unit.trim().is_empty() {
        errors.push(FieldError::new(
            &format!("{field}.unit"),
            FieldErrorKind::RequiredTogether,
            format!("{field} value must be accompanied by a unit"),
        ));
    }
}

fn require_nonempty_patch(any_field_set: bool, kind: &str, errors: &mut Vec<FieldError>) {
    if !any_field_set {
        errors.push(FieldError::new(
            kind,
            FieldErrorKind::Required,
            format!("{kind} patch must set at least one field"),
        ));
    }
}

pub fn validate_design_create(p: &DesignPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match &p.name {
        Some(name) => check_name("name", name, &mut errors),
        None => require("name", &mut errors),
    }
    match &p.capacity {
        Some(q) => check_quantity("capacity", q, &mut errors),
        None => require("capacity", &mut errors),
    }
    if let Some(desc) = &p.description {
        check_description(desc, &mut errors);
    }
    if let Some(q) = &p.wingspan {
        check_quantity("wingspan", q, &mut errors);
    }
    if p.status.is_some() {
        forbid("status", "status is assigned at creation", &mut errors);
    }
    errors
}

pub fn validate_design_patch(p: &DesignPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if let Some(name) = &p.name {
        check_name("name", name, &mut errors);
    }
    if let Some(desc) = &p.description {
        check_description(desc, &mut errors);
    }
    if let Some(q) = &p.capacity {
        check_quantity("capacity", q, &mut errors);
    }
    if let Some(q) = &p.wingspan {
        check_quantity("wingspan", q, &mut errors);
    }
    let any = p.name.is_some()
        || p.description.is_some()
        || p.capacity.is_some()
        || p.wingspan.is_some()
        || p.status.is_some();
    require_nonempty_patch(any, "design", &mut errors);
    errors
}

pub fn validate_component_create(p: &ComponentPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if p.design_id.is_none() {
        require("design_id", &mut errors);
    }
    match &p.name {
        Some(name) => check_name("name", name, &mut errors),
        None => require("name", &mut errors),
    }
    if p.classification.is_none() {
        require("classification", &mut errors);
    }
    match &p.weight {
        Some(q) => check_quantity("weight", q, &mut errors),
        None => require("weight", &mut errors),
    }
    errors
}

pub fn validate_component_patch(p: &ComponentPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if p.design_id.is_some() {
        forbid("design_id", "components cannot be re-parented", &mut errors);
    }
    if let Some(name) = &p.name {
        check_name("name", name, &mut errors);
    }
    if let Some(q) = &p.weight {
        check_quantity("weight", q, &mut errors);
    }
    let any = p.name.is_some() || p.classification.is_some() || p.weight.is_some();
    require_nonempty_patch(any, "component", &mut errors);
    errors
}

pub fn validate_test_create(p: &TestPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if p.design_id.is_none() {
        require("design_id", &mut errors);
    }
    match &p.name {
        Some(name) => check_name("name", name, &mut errors),
        None => require("name", &mut errors),
    }
    if p.category.is_none() {
        require("category", &mut errors);
    }
    if p.status.is_some() {
        forbid("status", "status is assigned at creation", &mut errors);
    }
    if p.outcome.is_some() {
        forbid("outcome", "outcome is only set when completing a test", &mut errors);
    }
    errors
}

pub fn validate_test_patch(p: &TestPayload) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if p.design_id.is_some() {
        forbid("design_id", "tests cannot be re-parented", &mut errors);
    }
    if let Some(name) = &p.name {
        check_name("name", name, &mut errors);
    }
    let any =
        p.name.is_some() || p.category.is_some() || p.status.is_some() || p.outcome.is_some();
    require_nonempty_patch(any, "test", &mut errors);
    errors
}

/// Conditional presence rule for test outcomes, evaluated against the
/// post-patch status: required once a test is completed, forbidden before.
pub fn validate_outcome_presence(
    status: TestStatus,
    outcome: Option<TestOutcome>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match (status, outcome) {
        (TestStatus::Completed, None) => errors.push(FieldError::new(
            "outcome",
            FieldErrorKind::Required,
            "outcome is required when a test is completed",
        )),
        (TestStatus::Planned | TestStatus::Running, Some(_)) => errors.push(FieldError::new(
            "outcome",
            FieldErrorKind::Forbidden,
            "outcome must not be set before a test is completed",
        )),
        _ => {}
    }
    errors
}
