//! TOML mutation-request envelope.
//!
//! A request names an operation, a resource kind, optionally a target id, and
//! at most one payload table matching the kind. Create and update share the
//! same payload shape with every field optional: which fields are required
//! for a create is the field validator's job, not the parser's.

use crate::resource::{
    ComponentClass, DesignStatus, ResourceKind, TestCategory, TestOutcome, TestStatus,
};
use crate::types::ResourceId;
use crate::units::Quantity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read request file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse request: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported request_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("operation '{0}' requires an id")]
    MissingId(Operation),
    #[error("operation '{operation}' on kind '{kind}' requires a [{kind}] payload table")]
    MissingPayload {
        operation: Operation,
        kind: ResourceKind,
    },
    #[error("delete requests must not carry a payload table")]
    UnexpectedPayload,
    #[error("payload table [{found}] does not match kind '{kind}'")]
    PayloadKindMismatch {
        kind: ResourceKind,
        found: ResourceKind,
    },
    #[error("create requests must not carry an id; ids are minted by the engine")]
    UnexpectedId,
}

/// State-changing operation. Reads go through the store, not through requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Design fields a request may set. Also serves as the PATCH shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub capacity: Option<Quantity>,
    #[serde(default)]
    pub wingspan: Option<Quantity>,
    #[serde(default)]
    pub status: Option<DesignStatus>,
}

/// Component fields a request may set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentPayload {
    /// Required at creation; rejected on updates (components cannot be re-parented).
    #[serde(default)]
    pub design_id: Option<ResourceId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classification: Option<ComponentClass>,
    #[serde(default)]
    pub weight: Option<Quantity>,
}

/// Test fields a request may set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestPayload {
    /// Required at creation; rejected on updates.
    #[serde(default)]
    pub design_id: Option<ResourceId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<TestCategory>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default)]
    pub outcome: Option<TestOutcome>,
}

/// Payload variant matching the request's kind. Delete requests carry none.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Design(DesignPayload),
    Component(ComponentPayload),
    Test(TestPayload),
    None,
}

/// A validated state-changing request, ready for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub id: Option<ResourceId>,
    pub payload: Payload,
}

/// Raw TOML envelope before cross-field checks.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestFile {
    request_version: u32,
    operation: Operation,
    kind: ResourceKind,
    #[serde(default)]
    id: Option<ResourceId>,
    #[serde(default)]
    design: Option<DesignPayload>,
    #[serde(default)]
    component: Option<ComponentPayload>,
    #[serde(default)]
    test: Option<TestPayload>,
}

impl RequestFile {
    fn into_request(self) -> Result<MutationRequest, RequestError> {
        if self.request_version != 1 {
            return Err(RequestError::UnsupportedVersion(self.request_version));
        }

        // Reject any payload table that does not match the declared kind.
        let tables = [
            (ResourceKind::Design, self.design.is_some()),
            (ResourceKind::Component, self.component.is_some()),
            (ResourceKind::Test, self.test.is_some()),
        ];
        for (table_kind, present) in tables {
            if present && table_kind != self.kind {
                return Err(RequestError::PayloadKindMismatch {
                    kind: self.kind,
                    found: table_kind,
                });
            }
        }

        let payload = match self.kind {
            ResourceKind::Design => self.design.map(Payload::Design),
            ResourceKind::Component => self.component.map(Payload::Component),
            ResourceKind::Test => self.test.map(Payload::Test),
        };

        let payload = match self.operation {
            Operation::Create => {
                if self.id.is_some() {
                    return Err(RequestError::UnexpectedId);
                }
                payload.ok_or(RequestError::MissingPayload {
                    operation: self.operation,
                    kind: self.kind,
                })?
            }
            Operation::Update => {
                if self.id.is_none() {
                    return Err(RequestError::MissingId(self.operation));
                }
                payload.ok_or(RequestError::MissingPayload {
                    operation: self.operation,
                    kind: self.kind,
                })?
            }
            Operation::Delete => {
                if self.id.is_none() {
                    return Err(RequestError::MissingId(self.operation));
                }
                if payload.is_some() {
                    return Err(RequestError::UnexpectedPayload);
                }
                Payload::None
            }
        };

        Ok(MutationRequest {
            operation: self.operation,
            kind: self.kind,
            id: self.id,
            payload,
        })
    }
}

pub fn parse_request_str(input: &str) -> Result<MutationRequest, RequestError> {
    let file: RequestFile = toml::from_str(input)?;
    file.into_request()
}

pub fn parse_request_file(path: impl AsRef<Path>) -> Result<MutationRequest, RequestError> {
    let content = fs::read_to_string(path)?;
    parse_request_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_design_create() {
        let input = r#"
request_version = 1
operation = "create"
kind = "design"

[design]
name = "A320neo wing"
description = "High aspect ratio wing"
capacity = { value = 42500.0, unit = "kg" }
wingspan = { value = 35.8, unit = "m" }
"#;
        let req = parse_request_str(input).expect("should parse");
        assert_eq!(req.operation, Operation::Create);
        assert_eq!(req.kind, ResourceKind::Design);
        assert!(req.id.is_none());
        let Payload::Design(p) = req.payload else {
            panic!("expected design payload");
        };
        assert_eq!(p.name.as_deref(), Some("A320neo wing"));
        assert_eq!(p.capacity.unwrap().unit, "kg");
    }

    #[test]
    fn parses_component_update_patch() {
        let input = r#"
request_version = 1
operation = "update"
kind = "component"
id = "c1"

[component]
weight = { value = 5200.0, unit = "kg" }
"#;
        let req = parse_request_str(input).expect("should parse");
        assert_eq!(req.id.as_ref().unwrap().as_str(), "c1");
        let Payload::Component(p) = req.payload else {
            panic!("expected component payload");
        };
        assert!(p.name.is_none());
        assert_eq!(p.weight.unwrap().value, 5200.0);
    }

    #[test]
    fn parses_delete_without_payload() {
        let input = r#"
request_version = 1
operation = "delete"
kind = "test"
id = "t1"
"#;
        let req = parse_request_str(input).expect("should parse");
        assert_eq!(req.payload, Payload::None);
    }

    #[test]
    fn rejects_unsupported_version() {
        let input = r#"
request_version = 2
operation = "delete"
kind = "design"
id = "d1"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn rejects_update_without_id() {
        let input = r#"
request_version = 1
operation = "update"
kind = "design"

[design]
name = "x"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::MissingId(Operation::Update))
        ));
    }

    #[test]
    fn rejects_create_with_id() {
        let input = r#"
request_version = 1
operation = "create"
kind = "design"
id = "d1"

[design]
name = "x"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::UnexpectedId)
        ));
    }

    #[test]
    fn rejects_create_without_payload() {
        let input = r#"
request_version = 1
operation = "create"
kind = "component"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::MissingPayload { .. })
        ));
    }

    #[test]
    fn rejects_payload_kind_mismatch() {
        let input = r#"
request_version = 1
operation = "create"
kind = "design"

[component]
name = "spar"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::PayloadKindMismatch { .. })
        ));
    }

    #[test]
    fn rejects_delete_with_payload() {
        let input = r#"
request_version = 1
operation = "delete"
kind = "design"
id = "d1"

[design]
name = "x"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::UnexpectedPayload)
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
request_version = 1
operation = "delete"
kind = "design"
id = "d1"
extra = true
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::ParseToml(_))
        ));
    }

    #[test]
    fn rejects_unknown_enum_value() {
        let input = r#"
request_version = 1
operation = "create"
kind = "component"

[component]
name = "spar"
classification = "magical"
"#;
        assert!(matches!(
            parse_request_str(input),
            Err(RequestError::ParseToml(_))
        ));
    }
}
