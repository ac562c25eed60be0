//! Graceful degradation: per-feature functionality tiers under stress.
//!
//! Each registered feature carries an independent degradation level
//! and degrade/recover hooks. Consumers branch on
//! [`DegradationManager::is_feature_available`] only; a feature is
//! available iff its level is `Normal`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use aegis_types::DegradationLevel;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::events::{EventBus, ResilienceEvent};

/// Callbacks fired when a feature degrades or recovers.
///
/// Hook failures are logged and swallowed; degradation bookkeeping
/// never depends on hook success.
#[async_trait]
pub trait DegradationHooks: Send + Sync {
    async fn on_degrade(&self, level: DegradationLevel, reason: &str) -> Result<()>;

    async fn on_recover(&self, reason: &str) -> Result<()>;
}

/// Hooks that do nothing, for features that only need the flag.
pub struct NoOpHooks;

#[async_trait]
impl DegradationHooks for NoOpHooks {
    async fn on_degrade(&self, _level: DegradationLevel, _reason: &str) -> Result<()> {
        Ok(())
    }

    async fn on_recover(&self, _reason: &str) -> Result<()> {
        Ok(())
    }
}

struct FeatureEntry {
    level: DegradationLevel,
    system_wide: bool,
    degraded_at: Option<Instant>,
    total_degraded: Duration,
    hooks: Arc<dyn DegradationHooks>,
}

/// Current state of one feature, for snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub name: String,
    pub level: DegradationLevel,
    pub available: bool,
    pub system_wide: bool,
}

/// Aggregate degradation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationMetrics {
    pub total_features: usize,
    pub degraded_features: usize,
    pub degrade_events: u64,
    pub recover_events: u64,
    /// Sum of completed degradation episode durations.
    pub total_degraded: Duration,
    pub system_level: DegradationLevel,
}

/// Tracks degradation level per named feature and system-wide.
pub struct DegradationManager {
    features: DashMap<String, FeatureEntry>,
    system_level: RwLock<DegradationLevel>,
    degrade_events: AtomicU64,
    recover_events: AtomicU64,
    events: EventBus,
}

impl DegradationManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            features: DashMap::new(),
            system_level: RwLock::new(DegradationLevel::Normal),
            degrade_events: AtomicU64::new(0),
            recover_events: AtomicU64::new(0),
            events,
        }
    }

    /// Register a feature with its degrade/recover hooks.
    ///
    /// `system_wide: false` opts the feature out of
    /// [`system_wide_degradation`](Self::system_wide_degradation).
    pub fn register_strategy(
        &self,
        feature: &str,
        hooks: Arc<dyn DegradationHooks>,
        system_wide: bool,
    ) {
        self.features.insert(
            feature.to_string(),
            FeatureEntry {
                level: DegradationLevel::Normal,
                system_wide,
                degraded_at: None,
                total_degraded: Duration::ZERO,
                hooks,
            },
        );
    }

    /// Move a feature to a degraded level.
    ///
    /// Passing `Normal` is equivalent to
    /// [`recover_feature`](Self::recover_feature). Features degrade
    /// implicitly registered with no-op hooks if unknown.
    pub async fn degrade_feature(
        &self,
        feature: &str,
        level: DegradationLevel,
        reason: &str,
    ) -> Result<()> {
        if level == DegradationLevel::Normal {
            return self.recover_feature(feature, reason).await;
        }

        // Mutate state under the map guard, then fire hooks without it.
        let hooks = {
            let mut entry = self
                .features
                .entry(feature.to_string())
                .or_insert_with(|| FeatureEntry {
                    level: DegradationLevel::Normal,
                    system_wide: true,
                    degraded_at: None,
                    total_degraded: Duration::ZERO,
                    hooks: Arc::new(NoOpHooks),
                });

            if entry.level == level {
                return Ok(());
            }
            if entry.degraded_at.is_none() {
                entry.degraded_at = Some(Instant::now());
            }
            entry.level = level;
            entry.hooks.clone()
        };

        self.degrade_events.fetch_add(1, Ordering::SeqCst);
        info!(feature = feature, level = %level, reason = reason, "Feature degraded");

        if let Err(err) = hooks.on_degrade(level, reason).await {
            warn!(feature = feature, error = %err, "Degrade hook failed");
        }

        self.events.emit(ResilienceEvent::FeatureDegraded {
            feature: feature.to_string(),
            level,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Recover a feature to `Normal`.
    ///
    /// Recovering an already-normal feature is a success no-op and
    /// does not touch the metrics.
    pub async fn recover_feature(&self, feature: &str, reason: &str) -> Result<()> {
        let hooks = {
            let mut entry = match self.features.get_mut(feature) {
                Some(entry) => entry,
                None => return Ok(()),
            };

            if entry.level == DegradationLevel::Normal {
                return Ok(());
            }
            if let Some(since) = entry.degraded_at.take() {
                entry.total_degraded += since.elapsed();
            }
            entry.level = DegradationLevel::Normal;
            entry.hooks.clone()
        };

        self.recover_events.fetch_add(1, Ordering::SeqCst);
        info!(feature = feature, reason = reason, "Feature recovered");

        if let Err(err) = hooks.on_recover(reason).await {
            warn!(feature = feature, error = %err, "Recover hook failed");
        }

        self.events.emit(ResilienceEvent::FeatureRecovered {
            feature: feature.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Degrade every feature that participates in system-wide events.
    pub async fn system_wide_degradation(&self, level: DegradationLevel, reason: &str) -> Result<()> {
        *self.system_level.write().unwrap() = level;

        let targets: Vec<String> = self
            .features
            .iter()
            .filter(|entry| entry.value().system_wide)
            .map(|entry| entry.key().clone())
            .collect();

        for feature in targets {
            self.degrade_feature(&feature, level, reason).await?;
        }
        Ok(())
    }

    /// Recover all features unconditionally.
    pub async fn system_wide_recovery(&self, reason: &str) -> Result<()> {
        *self.system_level.write().unwrap() = DegradationLevel::Normal;

        let targets: Vec<String> = self.features.iter().map(|entry| entry.key().clone()).collect();
        for feature in targets {
            self.recover_feature(&feature, reason).await?;
        }
        Ok(())
    }

    /// The single read path for consumers: true iff the feature is at
    /// `Normal` (unknown features count as available).
    pub fn is_feature_available(&self, feature: &str) -> bool {
        self.features
            .get(feature)
            .map(|entry| entry.level == DegradationLevel::Normal)
            .unwrap_or(true)
    }

    /// Current level for one feature.
    pub fn feature_level(&self, feature: &str) -> DegradationLevel {
        self.features
            .get(feature)
            .map(|entry| entry.level)
            .unwrap_or_default()
    }

    /// Snapshot of all features.
    pub fn feature_statuses(&self) -> Vec<FeatureStatus> {
        self.features
            .iter()
            .map(|entry| FeatureStatus {
                name: entry.key().clone(),
                level: entry.value().level,
                available: entry.value().level == DegradationLevel::Normal,
                system_wide: entry.value().system_wide,
            })
            .collect()
    }

    /// Aggregate metrics; in-progress episodes count their elapsed
    /// time so the total is monotonic across reads.
    pub fn metrics(&self) -> DegradationMetrics {
        let mut degraded = 0;
        let mut total = Duration::ZERO;
        for entry in self.features.iter() {
            if entry.value().level.is_degraded() {
                degraded += 1;
            }
            total += entry.value().total_degraded;
            if let Some(since) = entry.value().degraded_at {
                total += since.elapsed();
            }
        }

        DegradationMetrics {
            total_features: self.features.len(),
            degraded_features: degraded,
            degrade_events: self.degrade_events.load(Ordering::SeqCst),
            recover_events: self.recover_events.load(Ordering::SeqCst),
            total_degraded: total,
            system_level: *self.system_level.read().unwrap(),
        }
    }
}
