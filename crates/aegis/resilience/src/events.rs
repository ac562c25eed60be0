//! Events emitted by the resilience layer.
//!
//! Collaborators subscribe to a typed broadcast channel instead of a
//! stringly-keyed emitter; one event, many independent reactions.

use std::time::Duration;

use aegis_types::{DegradationLevel, FailureKind};
use tokio::sync::broadcast;

use crate::circuit_breaker::CircuitState;
use crate::metrics::MetricsSnapshot;

/// Events emitted by the orchestrator and its managers.
#[derive(Debug, Clone)]
pub enum ResilienceEvent {
    /// A resilient operation completed successfully.
    OperationSucceeded {
        name: String,
        duration: Duration,
        attempts: u32,
        patterns: Vec<&'static str>,
    },

    /// A resilient operation failed terminally.
    OperationFailed {
        name: String,
        duration: Duration,
        kind: FailureKind,
        error: String,
        patterns: Vec<&'static str>,
    },

    /// A circuit breaker changed state.
    CircuitBreakerStateChange {
        name: String,
        from: CircuitState,
        to: CircuitState,
    },

    /// A feature was degraded.
    FeatureDegraded {
        feature: String,
        level: DegradationLevel,
        reason: String,
    },

    /// A feature recovered to normal.
    FeatureRecovered { feature: String, reason: String },

    /// A healing action completed successfully.
    HealingSucceeded { kind: FailureKind, duration: Duration },

    /// A healing action failed or was refused.
    HealingFailed { kind: FailureKind, reason: String },

    /// A health check crossed its unhealthy threshold.
    HealthDegraded {
        check: String,
        consecutive_failures: u32,
    },

    /// A previously degraded health check succeeded again.
    HealthRecovered { check: String },

    /// Periodic metrics snapshot.
    MetricsUpdate(MetricsSnapshot),
}

/// Broadcast wrapper shared by the orchestrator and its managers.
///
/// Sending with no subscribers is not an error; events are purely
/// advisory.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ResilienceEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ResilienceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscriber case.
    pub fn emit(&self, event: ResilienceEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(ResilienceEvent::FeatureRecovered {
            feature: "search".into(),
            reason: "test".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(ResilienceEvent::FeatureDegraded {
            feature: "search".into(),
            level: DegradationLevel::Reduced,
            reason: "load".into(),
        });

        match rx.recv().await.unwrap() {
            ResilienceEvent::FeatureDegraded { feature, level, .. } => {
                assert_eq!(feature, "search");
                assert_eq!(level, DegradationLevel::Reduced);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
