// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key-to-strategy resolution.
//!
//! Every key belongs to a namespace, the substring before its first `:` or `_`.
//! A [`PolicyTable`] maps namespaces to a [`CacheStrategy`] that says which tier
//! stores the key, for how long, whether it is compressed and how eagerly it is
//! evicted. [`CacheOptions`] override the resolved strategy field by field.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use colcache_tier::{NAMESPACE_DELIMITERS, Priority, Ttl, namespace_of};
use serde::{Deserialize, Serialize};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The storage tier a key is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageTier {
    /// The in-process LRU tier, bounded by entry count.
    Memory,
    /// The synchronous key-value tier, bounded by bytes.
    PersistentSync,
    /// The asynchronous document tier, bounded by bytes.
    PersistentAsync,
}

impl StorageTier {
    /// Every tier, in maintenance order.
    pub const ALL: [Self; 3] = [Self::Memory, Self::PersistentSync, Self::PersistentAsync];

    /// Returns a short, stable name for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::PersistentSync => "persistent-sync",
            Self::PersistentAsync => "persistent-async",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a key is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStrategy {
    /// The tier that stores the key.
    pub storage_tier: StorageTier,
    /// Time to live from the moment of the write.
    pub ttl: Ttl,
    /// Whether values are compressed before storage.
    pub compression: bool,
    /// Eviction priority.
    pub priority: Priority,
}

impl CacheStrategy {
    /// Creates a strategy.
    #[must_use]
    pub const fn new(storage_tier: StorageTier, ttl: Ttl, compression: bool, priority: Priority) -> Self {
        Self {
            storage_tier,
            ttl,
            compression,
            priority,
        }
    }

    /// Applies the fields set in `options`.
    #[must_use]
    pub fn with_overrides(self, options: &CacheOptions) -> Self {
        Self {
            storage_tier: options.storage_tier.unwrap_or(self.storage_tier),
            ttl: options.ttl.unwrap_or(self.ttl),
            compression: options.compression.unwrap_or(self.compression),
            priority: options.priority.unwrap_or(self.priority),
        }
    }
}

impl Default for CacheStrategy {
    /// Memory tier, one hour, uncompressed, low priority.
    fn default() -> Self {
        Self::new(StorageTier::Memory, Ttl::Finite(HOUR), false, Priority::Low)
    }
}

/// Per-call overrides. Unset fields fall back to the resolved strategy.
///
/// # Examples
///
/// ```
/// use colcache::{CacheOptions, StorageTier};
/// use colcache_tier::{Priority, Ttl};
///
/// let options = CacheOptions::new()
///     .namespace("route")
///     .ttl(Ttl::from_secs(600))
///     .priority(Priority::High)
///     .storage_tier(StorageTier::PersistentSync);
/// assert_eq!(options.qualify("galibier"), "route:galibier");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    namespace: Option<String>,
    storage_tier: Option<StorageTier>,
    ttl: Option<Ttl>,
    compression: Option<bool>,
    priority: Option<Priority>,
}

impl CacheOptions {
    /// Creates options with nothing overridden.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the key in `namespace`. The key is stored as `namespace:key` unless it
    /// already carries that namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Overrides the storage tier.
    #[must_use]
    pub fn storage_tier(mut self, tier: StorageTier) -> Self {
        self.storage_tier = Some(tier);
        self
    }

    /// Overrides the time to live.
    #[must_use]
    pub fn ttl(mut self, ttl: Ttl) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Overrides compression.
    #[must_use]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = Some(enabled);
        self
    }

    /// Overrides the eviction priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Returns the storage key for `key`.
    #[must_use]
    pub fn qualify(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) if !has_namespace(key, namespace) => format!("{namespace}:{key}"),
            _ => key.to_string(),
        }
    }
}

fn has_namespace(key: &str, namespace: &str) -> bool {
    key.strip_prefix(namespace)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| NAMESPACE_DELIMITERS.contains(&c))
}

/// The namespace to strategy table.
///
/// # Examples
///
/// ```
/// use colcache::{PolicyTable, StorageTier};
/// use colcache_tier::Priority;
///
/// let policy = PolicyTable::with_defaults();
/// assert_eq!(policy.resolve("weather:paris").priority, Priority::High);
/// assert_eq!(policy.resolve("unknown:key").storage_tier, StorageTier::Memory);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    strategies: HashMap<String, CacheStrategy>,
    fallback: CacheStrategy,
}

impl PolicyTable {
    /// Creates an empty table that resolves every key to [`CacheStrategy::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table seeded with the built-in data categories.
    ///
    /// | namespace   | tier             | ttl      | compressed | priority |
    /// |-------------|------------------|----------|------------|----------|
    /// | `terrain`   | persistent-async | 7 days   | yes        | high     |
    /// | `elevation` | persistent-async | 7 days   | yes        | medium   |
    /// | `col`       | persistent-sync  | 1 day    | no         | high     |
    /// | `route`     | persistent-sync  | 1 day    | yes        | medium   |
    /// | `poi`       | persistent-sync  | 12 hours | no         | medium   |
    /// | `weather`   | memory           | 30 min   | no         | high     |
    /// | `forecast`  | persistent-sync  | 3 hours  | no         | high     |
    /// | `search`    | memory           | 5 min    | no         | low      |
    /// | `training`  | persistent-sync  | 7 days   | no         | medium   |
    /// | `nutrition` | persistent-sync  | 30 days  | no         | low      |
    #[must_use]
    pub fn with_defaults() -> Self {
        use Priority::{High, Low, Medium};
        use StorageTier::{Memory, PersistentAsync, PersistentSync};

        let days = |n: u32| Ttl::Finite(DAY * n);
        let hours = |n: u32| Ttl::Finite(HOUR * n);
        let minutes = |n: u32| Ttl::Finite(MINUTE * n);

        [
            ("terrain", CacheStrategy::new(PersistentAsync, days(7), true, High)),
            ("elevation", CacheStrategy::new(PersistentAsync, days(7), true, Medium)),
            ("col", CacheStrategy::new(PersistentSync, days(1), false, High)),
            ("route", CacheStrategy::new(PersistentSync, days(1), true, Medium)),
            ("poi", CacheStrategy::new(PersistentSync, hours(12), false, Medium)),
            ("weather", CacheStrategy::new(Memory, minutes(30), false, High)),
            ("forecast", CacheStrategy::new(PersistentSync, hours(3), false, High)),
            ("search", CacheStrategy::new(Memory, minutes(5), false, Low)),
            ("training", CacheStrategy::new(PersistentSync, days(7), false, Medium)),
            ("nutrition", CacheStrategy::new(PersistentSync, days(30), false, Low)),
        ]
        .into_iter()
        .fold(Self::new(), |table, (namespace, strategy)| table.insert(namespace, strategy))
    }

    /// Sets the strategy of `namespace`, replacing any previous one.
    #[must_use]
    pub fn insert(mut self, namespace: impl Into<String>, strategy: CacheStrategy) -> Self {
        self.strategies.insert(namespace.into(), strategy);
        self
    }

    /// Sets the strategy used when no namespace matches.
    #[must_use]
    pub fn fallback(mut self, strategy: CacheStrategy) -> Self {
        self.fallback = strategy;
        self
    }

    /// Returns the strategy registered for `namespace`.
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<&CacheStrategy> {
        self.strategies.get(namespace)
    }

    /// Resolves the strategy for `key` from its namespace.
    #[must_use]
    pub fn resolve(&self, key: &str) -> CacheStrategy {
        self.strategies.get(namespace_of(key)).copied().unwrap_or(self.fallback)
    }

    /// Resolves the strategy for `key` and applies `options`.
    #[must_use]
    pub fn resolve_with(&self, key: &str, options: &CacheOptions) -> CacheStrategy {
        self.resolve(key).with_overrides(options)
    }

    /// Number of registered namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns `true` if no namespace is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_namespace_uses_fallback() {
        let policy = PolicyTable::with_defaults();
        let strategy = policy.resolve("mystery:key");
        assert_eq!(strategy, CacheStrategy::default());
        assert_eq!(strategy.ttl, Ttl::Finite(Duration::from_secs(3_600)));
        assert_eq!(policy.resolve("nodelimiter"), CacheStrategy::default());
    }

    #[test]
    fn seeded_categories_resolve_by_namespace() {
        let policy = PolicyTable::with_defaults();
        assert_eq!(policy.len(), 10);

        let terrain = policy.resolve("terrain:alps");
        assert_eq!(terrain.storage_tier, StorageTier::PersistentAsync);
        assert_eq!(terrain.priority, Priority::High);
        assert!(terrain.compression);

        let weather = policy.resolve("weather_paris");
        assert_eq!(weather.storage_tier, StorageTier::Memory);
        assert!(weather.ttl.duration() < terrain.ttl.duration());

        assert_eq!(policy.resolve("search:col+du+galibier").priority, Priority::Low);
    }

    #[test]
    fn options_override_field_by_field() {
        let policy = PolicyTable::with_defaults();
        let options = CacheOptions::new().ttl(Ttl::Infinite).compression(true);
        let strategy = policy.resolve_with("weather:paris", &options);

        assert_eq!(strategy.ttl, Ttl::Infinite);
        assert!(strategy.compression);
        assert_eq!(strategy.storage_tier, StorageTier::Memory);
        assert_eq!(strategy.priority, Priority::High);
    }

    #[test]
    fn namespace_option_prefixes_key_once() {
        let options = CacheOptions::new().namespace("poi");
        assert_eq!(options.qualify("refuge"), "poi:refuge");
        assert_eq!(options.qualify("poi:refuge"), "poi:refuge");
        assert_eq!(options.qualify("poi_refuge"), "poi_refuge");
        assert_eq!(options.qualify("poisson"), "poi:poisson");
        assert_eq!(CacheOptions::new().qualify("bare"), "bare");
    }

    #[test]
    fn storage_tier_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&StorageTier::PersistentSync).unwrap(), "\"persistent-sync\"");
        assert_eq!(StorageTier::PersistentAsync.to_string(), "persistent-async");
    }
}
