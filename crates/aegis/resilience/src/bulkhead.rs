//! Bulkhead pattern: bounded concurrency pools per logical resource.
//!
//! Isolates a slow or failing dependency's concurrency so it cannot
//! starve unrelated operations sharing the process. Calls beyond the
//! concurrency limit queue FIFO up to a bound, then are rejected
//! immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::BulkheadConfig;
use crate::error::{ResilienceError, Result};

/// Decrements a gauge counter when dropped, including when the
/// surrounding future is cancelled mid-await.
struct CounterGuard<'a>(&'a AtomicUsize);

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A named concurrency pool.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,

    /// Calls currently waiting for a slot.
    queued: AtomicUsize,

    /// Calls currently executing.
    active: AtomicUsize,

    total_accepted: AtomicU64,
    total_rejected: AtomicU64,
    total_timed_out: AtomicU64,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            name: name.into(),
            config,
            semaphore,
            queued: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            total_accepted: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            total_timed_out: AtomicU64::new(0),
        }
    }

    /// Run a future inside this bulkhead.
    ///
    /// Admission: a free slot runs immediately; otherwise the call
    /// queues (FIFO via the semaphore's wait order) unless the queue
    /// is already at `max_queue_size`, in which case
    /// [`ResilienceError::BulkheadFull`] is returned without waiting.
    /// Admitted calls are bounded by the bulkhead's own timeout.
    pub async fn execute<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let permit = match self.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                let queued = self.queued.fetch_add(1, Ordering::SeqCst);
                let queue_guard = CounterGuard(&self.queued);
                if queued >= self.config.max_queue_size {
                    self.total_rejected.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        bulkhead = %self.name,
                        max_queue = self.config.max_queue_size,
                        "Rejecting call, queue full"
                    );
                    return Err(ResilienceError::BulkheadFull(self.name.clone()));
                }

                debug!(bulkhead = %self.name, "Queueing for a slot");
                // queue_guard releases the queue slot even if the
                // caller drops us while waiting here.
                let acquired = self.semaphore.acquire().await;
                drop(queue_guard);
                acquired.map_err(|_| {
                    ResilienceError::Internal(format!("bulkhead '{}' semaphore closed", self.name))
                })?
            }
        };

        self.total_accepted.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        let active_guard = CounterGuard(&self.active);

        let outcome = tokio::time::timeout(self.config.timeout, fut).await;

        drop(active_guard);
        drop(permit);

        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.total_timed_out.fetch_add(1, Ordering::SeqCst);
                warn!(
                    bulkhead = %self.name,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Admitted call exceeded bulkhead timeout"
                );
                Err(ResilienceError::OperationTimeout {
                    name: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    /// Current statistics for this pool.
    pub fn stats(&self) -> BulkheadStats {
        BulkheadStats {
            name: self.name.clone(),
            max_concurrency: self.config.max_concurrency,
            max_queue_size: self.config.max_queue_size,
            active: self.active.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
            total_accepted: self.total_accepted.load(Ordering::SeqCst),
            total_rejected: self.total_rejected.load(Ordering::SeqCst),
            total_timed_out: self.total_timed_out.load(Ordering::SeqCst),
        }
    }
}

/// Statistics for a bulkhead pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadStats {
    pub name: String,
    pub max_concurrency: usize,
    pub max_queue_size: usize,
    pub active: usize,
    pub queued: usize,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub total_timed_out: u64,
}

/// Registry of named bulkheads.
///
/// Pools are created explicitly via [`create_bulkhead`](Self::create_bulkhead)
/// or lazily with defaults on first execution.
pub struct BulkheadManager {
    bulkheads: DashMap<String, Arc<Bulkhead>>,
}

impl BulkheadManager {
    pub fn new() -> Self {
        Self {
            bulkheads: DashMap::new(),
        }
    }

    /// Register a pool with explicit limits. Re-registering a name
    /// keeps the existing pool so in-flight accounting survives.
    pub fn create_bulkhead(&self, name: &str, config: BulkheadConfig) -> Arc<Bulkhead> {
        self.bulkheads
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Bulkhead::new(name, config)))
            .clone()
    }

    /// Get or create (with defaults) the named pool.
    pub fn bulkhead(&self, name: &str) -> Arc<Bulkhead> {
        self.bulkheads
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(bulkhead = name, "Creating bulkhead with default limits");
                Arc::new(Bulkhead::new(name, BulkheadConfig::default()))
            })
            .clone()
    }

    /// Run a future inside the named pool.
    pub async fn execute<T, Fut>(&self, name: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.bulkhead(name).execute(fut).await
    }

    /// Snapshot of all pool stats.
    pub fn stats(&self) -> Vec<BulkheadStats> {
        self.bulkheads
            .iter()
            .map(|entry| entry.value().stats())
            .collect()
    }
}

impl Default for BulkheadManager {
    fn default() -> Self {
        Self::new()
    }
}
