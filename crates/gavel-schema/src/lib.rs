//! Resource model, request parsing, field validation, and unit conversion for Gavel.
//!
//! This crate defines the typed resource records (designs, components, tests),
//! the TOML mutation-request envelope, the field-level validator that collects
//! every structural error in a request, and the exact unit conversion tables
//! used for aggregate invariants. Everything here is pure data and pure
//! functions; nothing touches the store.

pub mod request;
pub mod resource;
pub mod types;
pub mod units;
pub mod validate;

pub use request::{
    parse_request_file, parse_request_str, ComponentPayload, DesignPayload, MutationRequest,
    Operation, Payload, RequestError, TestPayload,
};
pub use resource::{
    ComponentClass, ComponentSpec, DesignSpec, DesignStatus, Metadata, Resource, ResourceBody,
    ResourceKind, TestCategory, TestOutcome, TestSpec, TestStatus,
};
pub use types::{OpId, ResourceId};
pub use units::{convert, Dimension, Quantity, UnitError, EPSILON};
pub use validate::{FieldError, FieldErrorKind};
