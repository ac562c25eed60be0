//! Static safety gate over operation descriptions.
//!
//! A coarse keyword denylist applied before an operation runs. This
//! is a policy tripwire for obviously destructive descriptions, not a
//! sandbox; callers with a reviewed reason set
//! `ctx.safety_override` to bypass it.

use tracing::warn;

use crate::context::OperationContext;
use crate::error::{ResilienceError, Result};

const DENIED_KEYWORDS: &[&str] = &[
    "delete", "destroy", "drop", "exec", "eval", "shell", "rm -rf", "format",
];

/// Keyword-denylist gate consulted by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SafetyGate;

impl SafetyGate {
    pub fn new() -> Self {
        Self
    }

    /// Validate an operation against the denylist.
    ///
    /// Checks the context description case-insensitively. Operation
    /// names are identifiers, not free text, so a name like
    /// `execute_report` never trips the gate. `ctx.safety_override`
    /// skips the check.
    pub fn validate(&self, name: &str, ctx: &OperationContext) -> Result<()> {
        if ctx.safety_override {
            return Ok(());
        }
        let Some(description) = &ctx.description else {
            return Ok(());
        };

        let haystack = description.to_lowercase();
        for keyword in DENIED_KEYWORDS {
            if haystack.contains(keyword) {
                warn!(operation = name, keyword, "Safety gate rejected operation");
                return Err(ResilienceError::SafetyValidationFailed {
                    keyword: (*keyword).to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_description_passes() {
        let gate = SafetyGate::new();
        let ctx = OperationContext::new().with_description("fetch user profile");
        assert!(gate.validate("fetch_profile", &ctx).is_ok());
    }

    #[test]
    fn test_denied_keyword_in_description() {
        let gate = SafetyGate::new();
        let ctx = OperationContext::new().with_description("Delete all session rows");
        let err = gate.validate("cleanup", &ctx).unwrap_err();
        match err {
            ResilienceError::SafetyValidationFailed { keyword } => {
                assert_eq!(keyword, "delete");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_name_keywords_do_not_trip_gate() {
        let gate = SafetyGate::new();

        let ctx = OperationContext::new().with_description("render the monthly report");
        assert!(gate.validate("execute_report", &ctx).is_ok());

        // Without a description there is nothing to match against.
        assert!(gate.validate("drop_table", &OperationContext::new()).is_ok());
    }

    #[test]
    fn test_override_bypasses_gate() {
        let gate = SafetyGate::new();
        let ctx = OperationContext::new()
            .with_description("rm -rf the scratch directory")
            .with_safety_override();
        assert!(gate.validate("scratch_cleanup", &ctx).is_ok());
    }
}
