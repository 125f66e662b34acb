//! Typed resource records for the design/component/test registry.
//!
//! Every record shares the same envelope: an opaque id, a kind-tagged body,
//! a metadata block with soft-delete timestamp, and an integrity checksum
//! embedded by the store. Status fields are plain enums here; which moves
//! between statuses are legal is decided by the transition tables in
//! `gavel-core`, never by the model itself.

use crate::types::ResourceId;
use crate::units::Quantity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource kind discriminant, also used as the serde tag on [`ResourceBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Design,
    Component,
    Test,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Design => "design",
            ResourceKind::Component => "component",
            ResourceKind::Test => "test",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "design" => Ok(ResourceKind::Design),
            "component" => Ok(ResourceKind::Component),
            "test" => Ok(ResourceKind::Test),
            other => Err(format!(
                "unknown resource kind '{other}', expected design, component, or test"
            )),
        }
    }
}

/// Lifecycle status of a design. Drafts are freely mutable; approval freezes
/// the specification and every attached component and test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignStatus {
    Draft,
    Approved,
    Rejected,
    Completed,
}

impl DesignStatus {
    /// Approved and later statuses freeze the design and its dependents.
    pub fn is_approved_or_later(self) -> bool {
        matches!(self, DesignStatus::Approved | DesignStatus::Completed)
    }
}

impl fmt::Display for DesignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignStatus::Draft => write!(f, "draft"),
            DesignStatus::Approved => write!(f, "approved"),
            DesignStatus::Rejected => write!(f, "rejected"),
            DesignStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Lifecycle status of a test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Planned,
    Running,
    Completed,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Completed)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Planned => write!(f, "planned"),
            TestStatus::Running => write!(f, "running"),
            TestStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Classification of a component. Duplicate component names under one design
/// are legal only across different classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentClass {
    Structural,
    Avionics,
    Propulsion,
    Interior,
}

impl fmt::Display for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentClass::Structural => write!(f, "structural"),
            ComponentClass::Avionics => write!(f, "avionics"),
            ComponentClass::Propulsion => write!(f, "propulsion"),
            ComponentClass::Interior => write!(f, "interior"),
        }
    }
}

/// Category of a test. Immutable once the test reaches its terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCategory {
    Structural,
    Aerodynamic,
    Systems,
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCategory::Structural => write!(f, "structural"),
            TestCategory::Aerodynamic => write!(f, "aerodynamic"),
            TestCategory::Systems => write!(f, "systems"),
        }
    }
}

/// Recorded result of a completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOutcome::Pass => write!(f, "pass"),
            TestOutcome::Fail => write!(f, "fail"),
        }
    }
}

/// Creation, update, and soft-delete timestamps (RFC 3339).
///
/// A populated `deleted_at` marks the record immutable and excludes it from
/// default listings; records are never physically erased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl Metadata {
    pub fn new(now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Specification block of a design (the parent resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    pub name: String,
    pub status: DesignStatus,
    /// Monotonic revision counter, bumped whenever any specification field changes.
    pub revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Maximum total weight of attached components (mass dimension).
    pub capacity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<Quantity>,
}

/// A component attached to a design (the child resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Never null at creation; cleared only by the de-reference cascade when
    /// the owning draft design is soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_id: Option<ResourceId>,
    pub name: String,
    pub classification: ComponentClass,
    pub weight: Quantity,
}

/// A test record attached to a design (the measurement resource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub design_id: ResourceId,
    pub name: String,
    pub category: TestCategory,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TestOutcome>,
}

/// Kind-tagged resource body. Serialized with an inline `kind` tag so store
/// records and CLI output carry the discriminant explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceBody {
    Design(DesignSpec),
    Component(ComponentSpec),
    Test(TestSpec),
}

/// A versioned resource record as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    #[serde(flatten)]
    pub body: ResourceBody,
    pub meta: Metadata,
    /// blake3 checksum embedded by the store for integrity verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self.body {
            ResourceBody::Design(_) => ResourceKind::Design,
            ResourceBody::Component(_) => ResourceKind::Component,
            ResourceBody::Test(_) => ResourceKind::Test,
        }
    }

    pub fn name(&self) -> &str {
        match &self.body {
            ResourceBody::Design(d) => &d.name,
            ResourceBody::Component(c) => &c.name,
            ResourceBody::Test(t) => &t.name,
        }
    }

    /// The design this record references, if any. `None` for designs and for
    /// components that were de-referenced by a cascade.
    pub fn design_ref(&self) -> Option<&ResourceId> {
        match &self.body {
            ResourceBody::Design(_) => None,
            ResourceBody::Component(c) => c.design_id.as_ref(),
            ResourceBody::Test(t) => Some(&t.design_id),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.meta.deleted_at.is_some()
    }

    pub fn as_design(&self) -> Option<&DesignSpec> {
        match &self.body {
            ResourceBody::Design(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComponentSpec> {
        match &self.body {
            ResourceBody::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_test(&self) -> Option<&TestSpec> {
        match &self.body {
            ResourceBody::Test(t) => Some(t),
            _ => None,
        }
    }

    /// Human-readable status string for display; components have no status field.
    pub fn status_str(&self) -> String {
        match &self.body {
            ResourceBody::Design(d) => d.status.to_string(),
            ResourceBody::Component(_) => "-".to_owned(),
            ResourceBody::Test(t) => t.status.to_string(),
        }
    }
}
