//! Global operation counters and aggregate snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use aegis_types::DegradationLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bulkhead::BulkheadStats;
use crate::circuit_breaker::CircuitBreakerStats;
use crate::degradation::DegradationMetrics;
use crate::healing::HealingMetrics;
use crate::health::HealthCheckStatus;
use crate::timeout::TimeoutStats;

/// Process-lifetime counters for resilient operations.
pub struct GlobalMetrics {
    total_operations: AtomicU64,
    successful_operations: AtomicU64,
    failed_operations: AtomicU64,
    fallback_operations: AtomicU64,
    started_at: Instant,
}

impl GlobalMetrics {
    pub fn new() -> Self {
        Self {
            total_operations: AtomicU64::new(0),
            successful_operations: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            fallback_operations: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_success(&self) {
        self.total_operations.fetch_add(1, Ordering::SeqCst);
        self.successful_operations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.total_operations.fetch_add(1, Ordering::SeqCst);
        self.failed_operations.fetch_add(1, Ordering::SeqCst);
    }

    /// A fallback save counts as a success and as a fallback use.
    pub fn record_fallback(&self) {
        self.total_operations.fetch_add(1, Ordering::SeqCst);
        self.successful_operations.fetch_add(1, Ordering::SeqCst);
        self.fallback_operations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn counters(&self) -> OperationCounters {
        let total = self.total_operations.load(Ordering::SeqCst);
        let successful = self.successful_operations.load(Ordering::SeqCst);
        OperationCounters {
            total_operations: total,
            successful_operations: successful,
            failed_operations: self.failed_operations.load(Ordering::SeqCst),
            fallback_operations: self.fallback_operations.load(Ordering::SeqCst),
            success_rate: if total == 0 {
                1.0
            } else {
                successful as f64 / total as f64
            },
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable view of the global counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationCounters {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub fallback_operations: u64,
    pub success_rate: f64,
    pub uptime_secs: u64,
}

/// Point-in-time aggregate of every manager's statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub operations: OperationCounters,
    pub circuit_breakers: Vec<CircuitBreakerStats>,
    pub bulkheads: Vec<BulkheadStats>,
    pub timeouts: TimeoutStats,
    pub degradation: DegradationMetrics,
    pub healing: HealingMetrics,
    pub health_checks: Vec<HealthCheckStatus>,
}

/// Coarse liveness summary for dashboards and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub healthy: bool,
    pub system_degradation_level: DegradationLevel,
    pub open_circuits: Vec<String>,
    pub degraded_features: Vec<String>,
    pub degraded_checks: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_outcomes() {
        let metrics = GlobalMetrics::new();
        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();
        metrics.record_fallback();

        let counters = metrics.counters();
        assert_eq!(counters.total_operations, 4);
        assert_eq!(counters.successful_operations, 3);
        assert_eq!(counters.failed_operations, 1);
        assert_eq!(counters.fallback_operations, 1);
        assert!((counters.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_metrics_report_full_success_rate() {
        let counters = GlobalMetrics::new().counters();
        assert_eq!(counters.total_operations, 0);
        assert_eq!(counters.success_rate, 1.0);
    }
}
