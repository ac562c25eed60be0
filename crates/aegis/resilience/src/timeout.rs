//! Deadline enforcement per operation.
//!
//! Races each operation against a timer chosen by explicit policy,
//! category lookup, or keyword inference from the operation's
//! description. Cancellation is drop-based: the losing future is
//! dropped at the race boundary, so the operation stops at its next
//! await point rather than being abandoned to run forever.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use aegis_types::OperationId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TimeoutCategory;
use crate::context::OperationContext;
use crate::error::{ResilienceError, Result};

/// How a deadline is chosen for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Resolve from the context's category, then description
    /// keywords, then the default tier.
    #[default]
    Auto,

    /// No deadline at all.
    Disabled,

    /// Explicit deadline.
    Fixed(Duration),
}

/// Terminal or in-flight status of a tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Running,
    Completed,
    TimedOut,
    Failed,
}

/// One in-flight deadline-bound operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutRecord {
    pub id: OperationId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub timeout: Option<Duration>,
    pub status: OperationStatus,
}

/// Aggregate timeout manager statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutStats {
    pub in_flight: usize,
    pub total_completed: u64,
    pub total_timed_out: u64,
    pub total_failed: u64,
    /// Rolling average completion time of successful operations.
    pub avg_completion_ms: f64,
}

const COMPLETION_EMA_ALPHA: f64 = 0.2;

/// Removes the tracked record if the owning future is dropped before
/// it reaches a terminal status. A cancelled run counts as failed.
struct RecordGuard<'a> {
    manager: &'a TimeoutManager,
    id: OperationId,
    armed: bool,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.manager.records.remove(&self.id);
            self.manager.total_failed.fetch_add(1, Ordering::SeqCst);
            debug!(operation_id = %self.id, "Tracked operation cancelled before completion");
        }
    }
}

/// Enforces deadlines and tracks in-flight operations.
pub struct TimeoutManager {
    records: DashMap<OperationId, TimeoutRecord>,
    total_completed: AtomicU64,
    total_timed_out: AtomicU64,
    total_failed: AtomicU64,
    avg_completion_ms: RwLock<f64>,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            total_completed: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            avg_completion_ms: RwLock::new(0.0),
        }
    }

    /// Resolve the effective deadline for an operation.
    pub fn resolve_timeout(policy: TimeoutPolicy, ctx: &OperationContext) -> Option<Duration> {
        match policy {
            TimeoutPolicy::Fixed(duration) => Some(duration),
            TimeoutPolicy::Disabled => None,
            TimeoutPolicy::Auto => {
                let category = ctx.timeout_category.unwrap_or_else(|| {
                    ctx.description
                        .as_deref()
                        .map(TimeoutCategory::infer)
                        .unwrap_or_default()
                });
                Some(category.duration())
            }
        }
    }

    /// Race `fut` against the resolved deadline.
    ///
    /// Expiry returns [`ResilienceError::OperationTimeout`] and drops
    /// the operation future. If the returned future is itself dropped
    /// before completing, the tracked record is removed and the run
    /// counts as failed.
    pub async fn execute_with_timeout<T, Fut>(
        &self,
        name: &str,
        policy: TimeoutPolicy,
        ctx: &OperationContext,
        fut: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let timeout = Self::resolve_timeout(policy, ctx);
        let id = OperationId::generate();

        self.records.insert(
            id.clone(),
            TimeoutRecord {
                id: id.clone(),
                name: name.to_string(),
                started_at: Utc::now(),
                timeout,
                status: OperationStatus::Running,
            },
        );

        let mut guard = RecordGuard {
            manager: self,
            id: id.clone(),
            armed: true,
        };

        let started = Instant::now();
        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        operation = name,
                        timeout_ms = deadline.as_millis() as u64,
                        "Operation exceeded its deadline"
                    );
                    Err(ResilienceError::OperationTimeout {
                        name: name.to_string(),
                        timeout: deadline,
                    })
                }
            },
            None => fut.await,
        };

        let status = match &outcome {
            Ok(_) => OperationStatus::Completed,
            Err(ResilienceError::OperationTimeout { .. }) => OperationStatus::TimedOut,
            Err(_) => OperationStatus::Failed,
        };
        guard.armed = false;
        self.finish(&id, status, started.elapsed());

        outcome
    }

    /// Records still in flight, for inspection.
    pub fn in_flight(&self) -> Vec<TimeoutRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> TimeoutStats {
        TimeoutStats {
            in_flight: self.records.len(),
            total_completed: self.total_completed.load(Ordering::SeqCst),
            total_timed_out: self.total_timed_out.load(Ordering::SeqCst),
            total_failed: self.total_failed.load(Ordering::SeqCst),
            avg_completion_ms: *self.avg_completion_ms.read().unwrap(),
        }
    }

    fn finish(&self, id: &OperationId, status: OperationStatus, elapsed: Duration) {
        self.records.remove(id);

        match status {
            OperationStatus::Completed => {
                self.total_completed.fetch_add(1, Ordering::SeqCst);
                let mut avg = self.avg_completion_ms.write().unwrap();
                let sample = elapsed.as_secs_f64() * 1000.0;
                *avg = if *avg == 0.0 {
                    sample
                } else {
                    (1.0 - COMPLETION_EMA_ALPHA) * *avg + COMPLETION_EMA_ALPHA * sample
                };
            }
            OperationStatus::TimedOut => {
                self.total_timed_out.fetch_add(1, Ordering::SeqCst);
            }
            OperationStatus::Failed => {
                self.total_failed.fetch_add(1, Ordering::SeqCst);
            }
            OperationStatus::Running => {
                debug!("finish() called with non-terminal status");
            }
        }
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}
