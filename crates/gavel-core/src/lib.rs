//! Rule evaluation engine for Gavel resource registries.
//!
//! This crate ties together the schema model and the store into the `Engine`
//! — the single entry point that decides, for any state-changing request,
//! whether the mutation is legal: field validation, state-machine transition
//! checks, cross-resource invariants (unit-aware aggregates, referential
//! liveness, reciprocal readiness, uniqueness), and atomic cascade commits.
//! Every attempt, accepted or rejected, is reported to the audit sink.

pub mod audit;
pub mod cascade;
pub mod clock;
pub mod consistency;
pub mod engine;
pub mod lifecycle;
pub mod violation;

pub use audit::{
    read_audit_log, AuditEntry, AuditOutcome, AuditSink, JsonlAuditSink, MemoryAuditSink,
    TracingAuditSink,
};
pub use cascade::compute_design_delete;
pub use clock::{Clock, FixedClock, SystemClock};
pub use consistency::Snapshot;
pub use engine::Engine;
pub use lifecycle::{validate_transition, DESIGN_TRANSITIONS, TEST_TRANSITIONS};
pub use violation::{Evaluation, Violation, ViolationClass};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] gavel_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}
