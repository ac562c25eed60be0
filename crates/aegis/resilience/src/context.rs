//! Per-operation context threaded through the resilience layers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::TimeoutCategory;

/// Caller-supplied context for a resilient operation.
///
/// The description feeds the timeout heuristics and the safety gate;
/// metadata is carried through to events and healing strategies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Human-readable description of what the operation does.
    pub description: Option<String>,

    /// Explicit timeout tier, overriding description-based inference.
    pub timeout_category: Option<TimeoutCategory>,

    /// Bypass the safety gate for this operation.
    pub safety_override: bool,

    /// Additional context data.
    pub metadata: HashMap<String, String>,
}

impl OperationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the operation description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set an explicit timeout tier.
    pub fn with_timeout_category(mut self, category: TimeoutCategory) -> Self {
        self.timeout_category = Some(category);
        self
    }

    /// Bypass the safety gate.
    pub fn with_safety_override(mut self) -> Self {
        self.safety_override = true;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
