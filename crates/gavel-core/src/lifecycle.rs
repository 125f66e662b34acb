//! State-machine transition tables and the generic evaluator.
//!
//! One pure evaluator serves every resource kind: the directed transition
//! table is a parameter, edges are the only legal moves, and terminal
//! statuses simply have no outgoing edges. Staying on the same status is not
//! a legal move either; no edge here is idempotent.

use crate::violation::Violation;
use gavel_schema::{DesignStatus, TestStatus};
use std::fmt;

pub type TransitionTable<S> = &'static [(S, S)];

/// Legal design moves. Completed is reachable only through approval.
pub const DESIGN_TRANSITIONS: TransitionTable<DesignStatus> = &[
    (DesignStatus::Draft, DesignStatus::Approved),
    (DesignStatus::Draft, DesignStatus::Rejected),
    (DesignStatus::Rejected, DesignStatus::Draft),
    (DesignStatus::Approved, DesignStatus::Completed),
];

/// Legal test moves. A planned test may complete directly.
pub const TEST_TRANSITIONS: TransitionTable<TestStatus> = &[
    (TestStatus::Planned, TestStatus::Running),
    (TestStatus::Planned, TestStatus::Completed),
    (TestStatus::Running, TestStatus::Completed),
];

/// Check one requested move against a transition table.
///
/// Pure and stateless: it never reads or mutates any record.
pub fn validate_transition<S>(table: TransitionTable<S>, from: S, to: S) -> Result<(), Violation>
where
    S: Copy + Eq + fmt::Display,
{
    if table.iter().any(|&(f, t)| f == from && t == to) {
        Ok(())
    } else {
        Err(Violation::invalid_transition(from, to))
    }
}
