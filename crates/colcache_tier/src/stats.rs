// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;

/// The unit a tier measures its capacity in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityUnit {
    /// Capacity is a number of entries.
    Entries,
    /// Capacity is an estimated number of bytes.
    Bytes,
}

/// Activity counters a tier accumulates over its lifetime.
///
/// Counters are never reset, not even by a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TierCounters {
    /// Reads that returned a live entry.
    pub hits: u64,
    /// Reads that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed to respect capacity.
    pub evictions: u64,
    /// Entries removed because their expiry passed.
    pub expirations: u64,
}

impl TierCounters {
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

/// A point-in-time snapshot of one tier's occupancy.
///
/// `size` is always the number of live entries; `capacity` and `usage` are in
/// [`TierStats::unit`]. For an entry-counted tier `usage == size`.
///
/// # Examples
///
/// ```
/// use colcache_tier::{CapacityUnit, TierStats};
///
/// let stats = TierStats::new(CapacityUnit::Bytes, 12, 1_000, 900);
/// assert!((stats.usage_ratio() - 0.9).abs() < f64::EPSILON);
/// assert_eq!(stats.usage_percent(), 90);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    unit: CapacityUnit,
    size: u64,
    capacity: u64,
    usage: u64,
    #[serde(flatten)]
    counters: TierCounters,
}

impl TierStats {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(unit: CapacityUnit, size: u64, capacity: u64, usage: u64) -> Self {
        Self {
            unit,
            size,
            capacity,
            usage,
            counters: TierCounters::default(),
        }
    }

    /// Attaches activity counters.
    #[must_use]
    pub fn with_counters(mut self, counters: TierCounters) -> Self {
        self.counters = counters;
        self
    }

    /// Activity counters.
    #[must_use]
    pub fn counters(&self) -> TierCounters {
        self.counters
    }

    /// Hit rate of the attached counters.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        self.counters.hit_rate()
    }

    /// Snapshot of a tier that is not available.
    #[must_use]
    pub fn unavailable(unit: CapacityUnit) -> Self {
        Self::new(unit, 0, 0, 0)
    }

    /// The unit of `capacity` and `usage`.
    #[must_use]
    pub fn unit(&self) -> CapacityUnit {
        self.unit
    }

    /// Number of live entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Current usage.
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage
    }

    /// Usage divided by capacity; `0.0` when the capacity is zero.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "ratio only feeds threshold comparisons")]
    pub fn usage_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.usage as f64 / self.capacity as f64
    }

    /// Usage as a whole percentage of capacity.
    #[must_use]
    pub fn usage_percent(&self) -> u64 {
        if self.capacity == 0 {
            return 0;
        }
        u64::try_from(u128::from(self.usage) * 100 / u128::from(self.capacity)).unwrap_or(u64::MAX)
    }

    /// Returns the usage this tier must be pruned down to so that it sits at
    /// `fraction` of its capacity.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "fraction is clamped to [0, 1] so the product fits in u64"
    )]
    pub fn target_for(&self, fraction: f64) -> u64 {
        (self.capacity as f64 * fraction.clamp(0.0, 1.0)).floor() as u64
    }
}
