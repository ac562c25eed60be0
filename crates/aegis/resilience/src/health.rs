//! Periodic health checks over async probes.
//!
//! Each registered check runs its probe on an interval and tracks
//! consecutive failures. Crossing the unhealthy threshold opens a
//! degraded episode (reported once); the first subsequent success
//! closes it. When handles to the degradation and self-healing
//! managers are attached, episodes drive them directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use aegis_types::{DegradationLevel, FailureKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HealthCheckConfig;
use crate::context::OperationContext;
use crate::degradation::DegradationManager;
use crate::error::{ResilienceError, Result};
use crate::events::{EventBus, ResilienceEvent};
use crate::healing::SelfHealingManager;

/// Result of one probe execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub healthy: bool,
    pub detail: String,
}

impl ProbeReport {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// An async health probe for one subsystem.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> ProbeReport;
}

struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ProbeReport> + Send,
{
    async fn probe(&self) -> ProbeReport {
        (self.0)().await
    }
}

/// Wrap an async closure as a [`HealthProbe`].
pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn HealthProbe>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ProbeReport> + Send + 'static,
{
    Arc::new(FnProbe(f))
}

struct CheckEntry {
    probe: Arc<dyn HealthProbe>,
    config: HealthCheckConfig,
    consecutive_failures: u32,
    degraded: bool,
    last_report: Option<ProbeReport>,
    last_checked: Option<DateTime<Utc>>,
}

/// Externally visible status of one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckStatus {
    pub name: String,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_report: Option<ProbeReport>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// State shared between the manager and its interval tasks.
struct HealthInner {
    checks: DashMap<String, CheckEntry>,
    events: EventBus,
    degradation: RwLock<Option<Arc<DegradationManager>>>,
    healing: RwLock<Option<Arc<SelfHealingManager>>>,
}

enum Episode {
    Opened { failures: u32, detail: String },
    Closed,
    Unchanged,
}

impl HealthInner {
    async fn run_check_once(&self, name: &str) -> Result<ProbeReport> {
        let (probe, config) = {
            let entry = self
                .checks
                .get(name)
                .ok_or_else(|| ResilienceError::NotRegistered {
                    entity: "health check",
                    name: name.to_string(),
                })?;
            (entry.probe.clone(), entry.config.clone())
        };

        let report = match tokio::time::timeout(config.probe_timeout, probe.probe()).await {
            Ok(report) => report,
            Err(_) => ProbeReport::unhealthy(format!(
                "probe timed out after {:?}",
                config.probe_timeout
            )),
        };

        self.apply_report(name, &config, report.clone()).await;
        Ok(report)
    }

    async fn apply_report(&self, name: &str, config: &HealthCheckConfig, report: ProbeReport) {
        let episode = {
            let mut entry = match self.checks.get_mut(name) {
                Some(entry) => entry,
                None => return,
            };
            entry.last_checked = Some(Utc::now());
            entry.last_report = Some(report.clone());

            if report.healthy {
                entry.consecutive_failures = 0;
                if entry.degraded {
                    entry.degraded = false;
                    Episode::Closed
                } else {
                    Episode::Unchanged
                }
            } else {
                entry.consecutive_failures += 1;
                if !entry.degraded && entry.consecutive_failures >= config.unhealthy_threshold {
                    entry.degraded = true;
                    Episode::Opened {
                        failures: entry.consecutive_failures,
                        detail: report.detail.clone(),
                    }
                } else {
                    Episode::Unchanged
                }
            }
        };

        match episode {
            Episode::Opened { failures, detail } => {
                warn!(
                    check = name,
                    consecutive_failures = failures,
                    "Health check crossed unhealthy threshold"
                );
                self.events.emit(ResilienceEvent::HealthDegraded {
                    check: name.to_string(),
                    consecutive_failures: failures,
                });

                let degradation = self.degradation.read().unwrap().clone();
                if let Some(degradation) = degradation {
                    let _ = degradation
                        .degrade_feature(name, DegradationLevel::Reduced, &detail)
                        .await;
                }
                let healing = self.healing.read().unwrap().clone();
                if let Some(healing) = healing {
                    let kind = FailureKind::classify(&detail);
                    let ctx = OperationContext::new().with_description(detail);
                    let _ = healing.attempt_healing(kind, &ctx).await;
                }
            }
            Episode::Closed => {
                info!(check = name, "Health check recovered");
                self.events.emit(ResilienceEvent::HealthRecovered {
                    check: name.to_string(),
                });
                let degradation = self.degradation.read().unwrap().clone();
                if let Some(degradation) = degradation {
                    let _ = degradation
                        .recover_feature(name, "health check passing")
                        .await;
                }
            }
            Episode::Unchanged => {
                debug!(check = name, healthy = report.healthy, "Health check ran");
            }
        }
    }
}

/// Runs registered probes on their intervals and reports episodes.
pub struct HealthCheckManager {
    inner: Arc<HealthInner>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
}

impl HealthCheckManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            inner: Arc::new(HealthInner {
                checks: DashMap::new(),
                events,
                degradation: RwLock::new(None),
                healing: RwLock::new(None),
            }),
            tasks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Attach the degradation manager so unhealthy episodes degrade
    /// the feature sharing the check's name.
    pub fn with_degradation(self, degradation: Arc<DegradationManager>) -> Self {
        *self.inner.degradation.write().unwrap() = Some(degradation);
        self
    }

    /// Attach the self-healing manager so unhealthy episodes trigger
    /// a healing attempt for the classified failure kind.
    pub fn with_healing(self, healing: Arc<SelfHealingManager>) -> Self {
        *self.inner.healing.write().unwrap() = Some(healing);
        self
    }

    /// Register (or replace) a named check.
    ///
    /// While the manager is running, registration also starts the
    /// check's interval task immediately (replacing any existing task
    /// for the name), so late registrations are not skipped.
    pub fn register(&self, name: &str, probe: Arc<dyn HealthProbe>, config: HealthCheckConfig) {
        let interval = config.interval;
        self.inner.checks.insert(
            name.to_string(),
            CheckEntry {
                probe,
                config,
                consecutive_failures: 0,
                degraded: false,
                last_report: None,
                last_checked: None,
            },
        );
        if self.running.load(Ordering::SeqCst) {
            self.spawn_check_task(name.to_string(), interval);
        }
    }

    /// Run one probe immediately and apply its result.
    pub async fn run_check_once(&self, name: &str) -> Result<ProbeReport> {
        self.inner.run_check_once(name).await
    }

    /// Start one interval task per registered check.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let checks: Vec<(String, std::time::Duration)> = self
            .inner
            .checks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().config.interval))
            .collect();
        for (name, interval) in checks {
            self.spawn_check_task(name, interval);
        }

        info!(checks = self.inner.checks.len(), "Health check manager started");
    }

    fn spawn_check_task(&self, name: String, interval: std::time::Duration) {
        let inner = self.inner.clone();
        let check = name.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately; skip it so the
            // initial probe runs one interval after start.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = inner.run_check_once(&check).await {
                    warn!(check = %check, error = %err, "Health check run failed");
                }
            }
        });
        if let Some(previous) = self.tasks.lock().unwrap().insert(name, handle) {
            previous.abort();
        }
    }

    /// Abort all interval tasks.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap();
        for (_, task) in tasks.drain() {
            task.abort();
        }
        info!("Health check manager stopped");
    }

    /// Statuses of every registered check.
    pub fn statuses(&self) -> Vec<HealthCheckStatus> {
        self.inner
            .checks
            .iter()
            .map(|entry| HealthCheckStatus {
                name: entry.key().clone(),
                degraded: entry.value().degraded,
                consecutive_failures: entry.value().consecutive_failures,
                last_report: entry.value().last_report.clone(),
                last_checked: entry.value().last_checked,
            })
            .collect()
    }

    /// True when no check is inside a degraded episode.
    pub fn all_healthy(&self) -> bool {
        self.inner.checks.iter().all(|entry| !entry.value().degraded)
    }
}
