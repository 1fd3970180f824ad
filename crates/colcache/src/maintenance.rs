// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Periodic expiry sweeps and capacity enforcement.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::policy::StorageTier;

/// Default pause between two maintenance passes.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest pause accepted between two maintenance passes.
pub const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Default usage ratio at which a tier is pruned.
pub const DEFAULT_ENFORCE_RATIO: f64 = 0.9;

/// Default usage ratio a pruned tier is brought down to.
pub const DEFAULT_TARGET_RATIO: f64 = 0.7;

/// When maintenance runs and how hard it prunes.
///
/// A pass first sweeps expired entries from every tier, then prunes each tier
/// whose usage ratio is at or above `enforce_ratio` down to `target_ratio` of its
/// capacity.
///
/// The builder applies [`normalized`](Self::normalized) to every config it is given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaintenanceConfig {
    /// Pause between the end of one pass and the start of the next.
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Usage ratio that triggers pruning.
    pub enforce_ratio: f64,
    /// Usage ratio pruning stops at.
    pub target_ratio: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MAINTENANCE_INTERVAL,
            enforce_ratio: DEFAULT_ENFORCE_RATIO,
            target_ratio: DEFAULT_TARGET_RATIO,
        }
    }
}

impl MaintenanceConfig {
    /// Returns a config the maintenance loop can run with.
    ///
    /// The interval is raised to [`MIN_MAINTENANCE_INTERVAL`]. Ratios that are not
    /// finite fall back to their defaults, `enforce_ratio` is clamped to `0..=1` and
    /// `target_ratio` to `0..=enforce_ratio`.
    #[must_use]
    pub fn normalized(self) -> Self {
        let enforce_ratio = finite_or(self.enforce_ratio, DEFAULT_ENFORCE_RATIO).clamp(0.0, 1.0);
        let target_ratio = finite_or(self.target_ratio, DEFAULT_TARGET_RATIO).clamp(0.0, enforce_ratio);
        Self {
            interval: self.interval.max(MIN_MAINTENANCE_INTERVAL),
            enforce_ratio,
            target_ratio,
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::cast_possible_truncation, reason = "intervals are far below u64::MAX milliseconds")]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// What one pass did to one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierMaintenance {
    /// The tier.
    pub tier: StorageTier,
    /// Entries removed by the expiry sweep.
    pub expired: u64,
    /// Entries removed by pruning.
    pub evicted: u64,
    /// Usage after the sweep, before pruning.
    pub usage_before: u64,
    /// Usage at the end of the pass.
    pub usage_after: u64,
    /// Whether any call to the tier failed during the pass.
    pub degraded: bool,
}

impl TierMaintenance {
    pub(crate) fn new(tier: StorageTier) -> Self {
        Self {
            tier,
            expired: 0,
            evicted: 0,
            usage_before: 0,
            usage_after: 0,
            degraded: false,
        }
    }
}

/// The outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// One record per configured tier, in maintenance order.
    pub tiers: Vec<TierMaintenance>,
}

impl MaintenanceReport {
    /// Returns the record of `tier`, if it is configured.
    #[must_use]
    pub fn tier(&self, tier: StorageTier) -> Option<&TierMaintenance> {
        self.tiers.iter().find(|record| record.tier == tier)
    }

    /// Expired entries removed across tiers.
    #[must_use]
    pub fn expired(&self) -> u64 {
        self.tiers.iter().map(|record| record.expired).sum()
    }

    /// Entries pruned across tiers.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.tiers.iter().map(|record| record.evicted).sum()
    }
}

/// The background maintenance loop started by
/// [`UnifiedCache::start_maintenance`](crate::UnifiedCache::start_maintenance).
///
/// The loop stops when the handle is dropped or when the last handle of the
/// cache is dropped.
#[derive(Debug)]
pub struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stops the loop. A pass in progress is abandoned at its next suspension point.
    pub fn stop(self) {
        drop(self);
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_partial_json() {
        let config: MaintenanceConfig = serde_json::from_str(r#"{ "interval": 1500 }"#).unwrap();
        assert_eq!(config.interval, Duration::from_millis(1_500));
        assert!((config.enforce_ratio - DEFAULT_ENFORCE_RATIO).abs() < f64::EPSILON);
        assert!((config.target_ratio - DEFAULT_TARGET_RATIO).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let config: MaintenanceConfig = serde_json::from_str(r#"{ "interval": 0 }"#).unwrap();
        assert_eq!(config.normalized().interval, MIN_MAINTENANCE_INTERVAL);

        let slow = MaintenanceConfig {
            interval: Duration::from_secs(600),
            ..MaintenanceConfig::default()
        };
        assert_eq!(slow.normalized().interval, Duration::from_secs(600));
    }

    #[test]
    fn ratios_are_bounded() {
        let inverted = MaintenanceConfig {
            enforce_ratio: 0.5,
            target_ratio: 0.8,
            ..MaintenanceConfig::default()
        }
        .normalized();
        assert!((inverted.target_ratio - 0.5).abs() < f64::EPSILON);

        let wild = MaintenanceConfig {
            enforce_ratio: f64::NAN,
            target_ratio: -3.0,
            ..MaintenanceConfig::default()
        }
        .normalized();
        assert!((wild.enforce_ratio - DEFAULT_ENFORCE_RATIO).abs() < f64::EPSILON);
        assert!(wild.target_ratio.abs() < f64::EPSILON);

        let over = MaintenanceConfig {
            enforce_ratio: 4.0,
            target_ratio: f64::INFINITY,
            ..MaintenanceConfig::default()
        }
        .normalized();
        assert!((over.enforce_ratio - 1.0).abs() < f64::EPSILON);
        assert!((over.target_ratio - DEFAULT_TARGET_RATIO).abs() < f64::EPSILON);
    }

    #[test]
    fn report_totals() {
        let mut memory = TierMaintenance::new(StorageTier::Memory);
        memory.expired = 2;
        let mut sync = TierMaintenance::new(StorageTier::PersistentSync);
        sync.expired = 1;
        sync.evicted = 4;

        let report = MaintenanceReport { tiers: vec![memory, sync] };
        assert_eq!(report.expired(), 3);
        assert_eq!(report.evicted(), 4);
        assert_eq!(report.tier(StorageTier::PersistentSync).unwrap().evicted, 4);
        assert!(report.tier(StorageTier::PersistentAsync).is_none());
    }
}
