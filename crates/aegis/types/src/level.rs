//! Degradation levels for feature availability under stress.

use serde::{Deserialize, Serialize};

/// How far a feature has been degraded from full functionality.
///
/// Levels are ordered: `Normal < Reduced < Minimal < Emergency`.
/// A feature is considered available only at [`Normal`](Self::Normal).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum DegradationLevel {
    /// Full functionality.
    #[default]
    Normal,

    /// Non-essential behavior disabled, core paths intact.
    Reduced,

    /// Only critical behavior remains.
    Minimal,

    /// Bare survival mode; everything optional is off.
    Emergency,
}

impl DegradationLevel {
    /// Whether this level represents any degradation at all.
    pub fn is_degraded(&self) -> bool {
        *self != DegradationLevel::Normal
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradationLevel::Normal => write!(f, "normal"),
            DegradationLevel::Reduced => write!(f, "reduced"),
            DegradationLevel::Minimal => write!(f, "minimal"),
            DegradationLevel::Emergency => write!(f, "emergency"),
        }
    }
}
