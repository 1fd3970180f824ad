// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use colcache_tier::TierStats;
use serde::Serialize;

use crate::policy::StorageTier;

/// A snapshot of every configured tier plus the orchestrator's own read counters.
///
/// Tier counters count what each tier saw; `hits` and `misses` count what callers
/// of [`UnifiedCache::get`](crate::UnifiedCache::get) saw, with degraded reads
/// counted as misses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// The memory tier.
    pub memory: TierStats,
    /// The synchronous persistent tier, when configured.
    pub persistent_sync: Option<TierStats>,
    /// The asynchronous persistent tier, when configured.
    pub persistent_async: Option<TierStats>,
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that returned nothing.
    pub misses: u64,
}

impl CacheStats {
    /// Returns the snapshot of `tier`, if configured.
    #[must_use]
    pub fn tier(&self, tier: StorageTier) -> Option<&TierStats> {
        match tier {
            StorageTier::Memory => Some(&self.memory),
            StorageTier::PersistentSync => self.persistent_sync.as_ref(),
            StorageTier::PersistentAsync => self.persistent_async.as_ref(),
        }
    }

    /// Iterates the configured tiers in maintenance order.
    pub fn tiers(&self) -> impl Iterator<Item = (StorageTier, &TierStats)> {
        StorageTier::ALL
            .into_iter()
            .filter_map(|tier| self.tier(tier).map(|stats| (tier, stats)))
    }

    /// `hits / (hits + misses)`, or `0.0` before the first read.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "ratio is informational")]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits.saturating_add(self.misses);
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use colcache_tier::CapacityUnit;

    use super::*;

    #[test]
    fn tiers_skips_unconfigured() {
        let stats = CacheStats {
            memory: TierStats::new(CapacityUnit::Entries, 1, 10, 1),
            persistent_sync: None,
            persistent_async: Some(TierStats::new(CapacityUnit::Bytes, 2, 1_000, 400)),
            hits: 3,
            misses: 1,
        };

        let tiers: Vec<_> = stats.tiers().map(|(tier, _)| tier).collect();
        assert_eq!(tiers, [StorageTier::Memory, StorageTier::PersistentAsync]);
        assert!(stats.tier(StorageTier::PersistentSync).is_none());
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_for_dashboards() {
        let stats = CacheStats {
            memory: TierStats::new(CapacityUnit::Entries, 0, 100, 0),
            persistent_sync: None,
            persistent_async: None,
            hits: 0,
            misses: 0,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["memory"]["unit"], "entries");
        assert_eq!(json["persistentSync"], serde_json::Value::Null);
        assert!(stats.hit_rate().abs() < f64::EPSILON);
    }
}
