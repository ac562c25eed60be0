//! Core types shared across the Aegis resilience orchestration layer.
//!
//! Strongly-typed identifiers, degradation levels, and failure
//! classification used by every resilience component.

mod failure;
mod ids;
mod level;

pub use failure::FailureKind;
pub use ids::{HealingAttemptId, OperationId};
pub use level::DegradationLevel;
