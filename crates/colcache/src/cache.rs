// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The policy-driven tiered cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use colcache_codec::Codec;
use colcache_tier::{CacheEntry, CacheTier, DynamicTier, Error, ErrorKind, Result};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tick::{Clock, FutureExt as _};

use crate::builder::UnifiedCacheBuilder;
use crate::maintenance::{MaintenanceConfig, MaintenanceHandle, MaintenanceReport, TierMaintenance};
use crate::policy::{CacheOptions, CacheStrategy, PolicyTable, StorageTier};
use crate::source::{DataSource, DataSources};
use crate::stats::CacheStats;
use crate::telemetry::{CacheActivity, CacheEvent, CacheOperation, CacheTelemetry};
use crate::warm_up::{WarmUp, WarmUpHandle};

/// Type alias for cache names used in telemetry.
pub type CacheName = &'static str;

/// Which entries [`UnifiedCache::clear`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every entry in every tier.
    All,
    /// Every key starting with the given namespace, in every tier.
    Namespace(String),
}

impl ClearScope {
    /// Creates a [`ClearScope::Namespace`].
    #[must_use]
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::Namespace(namespace.into())
    }
}

#[derive(Debug)]
pub(crate) struct CacheInner {
    pub(crate) name: CacheName,
    pub(crate) clock: Clock,
    pub(crate) policy: PolicyTable,
    pub(crate) codec: Codec,
    pub(crate) memory: DynamicTier<Value>,
    pub(crate) persistent_sync: Option<DynamicTier<Value>>,
    pub(crate) persistent_async: Option<DynamicTier<Value>>,
    pub(crate) sources: RwLock<DataSources>,
    pub(crate) maintenance: MaintenanceConfig,
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) telemetry: CacheTelemetry,
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
}

/// A tiered cache that routes every key to a storage tier by policy.
///
/// Keys are resolved through a [`PolicyTable`] into a [`CacheStrategy`] that picks
/// the tier, TTL, compression and eviction priority. Values cross the cache as any
/// `serde` type and are stored as JSON.
///
/// The plain operations ([`get`](Self::get), [`set`](Self::set), [`delete`](Self::delete),
/// [`clear`](Self::clear), [`preload`](Self::preload)) never fail: a miss, an expired
/// entry and a failing tier all read as `None` or `false`, and failures are logged.
/// [`try_get`](Self::try_get) and [`try_set`](Self::try_set) return the underlying
/// [`Error`] for callers that need to tell them apart.
///
/// A strategy that names a tier the cache was not built with falls back to the
/// memory tier. Cloning is cheap; clones share every tier.
///
/// # Examples
///
/// ```
/// use colcache::UnifiedCache;
/// use colcache_persist::MemoryKeyValueStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let cache = UnifiedCache::builder(Clock::new_frozen())
///     .key_value_store(MemoryKeyValueStore::new())
///     .build();
///
/// assert!(cache.set("col:galibier", &2642_u32).await);
/// assert_eq!(cache.get::<u32>("col:galibier").await, Some(2642));
/// assert!(cache.delete("col:galibier").await);
/// assert_eq!(cache.get::<u32>("col:galibier").await, None);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct UnifiedCache {
    inner: Arc<CacheInner>,
}

impl UnifiedCache {
    /// Creates a builder reading time from `clock`.
    #[must_use]
    pub fn builder(clock: Clock) -> UnifiedCacheBuilder {
        UnifiedCacheBuilder::new(clock)
    }

    pub(crate) fn from_inner(inner: CacheInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Returns the name of this cache for telemetry identification.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.inner.name
    }

    /// Returns the clock used for expiry, timestamps and scheduling.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns the policy table keys are resolved through.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.inner.policy
    }

    /// Returns `true` if the cache was built with `tier`.
    #[must_use]
    pub fn has_tier(&self, tier: StorageTier) -> bool {
        self.tier(tier).is_some()
    }

    /// Reads `key`, or `None` on a miss, an expired entry or a failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with(key, &CacheOptions::default()).await
    }

    /// Reads `key` with per-call overrides.
    pub async fn get_with<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Option<T> {
        self.try_get_with(key, options).await.ok().flatten()
    }

    /// Reads `key`, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier call fails or times out, or if the stored value
    /// does not deserialize into `T`.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.try_get_with(key, &CacheOptions::default()).await
    }

    /// Reads `key` with per-call overrides, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier call fails or times out, or if the stored value
    /// does not deserialize into `T`.
    pub async fn try_get_with<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Result<Option<T>> {
        let key = options.qualify(key);
        let strategy = self.inner.policy.resolve_with(&key, options);
        let (tier, storage) = self.route(strategy.storage_tier);
        let stopwatch = self.inner.clock.stopwatch();

        let result = self.bounded(storage.get(&key)).await.and_then(|entry| {
            entry
                .map(|entry| {
                    let value = self.inner.codec.decompress(entry.into_value());
                    serde_json::from_value::<T>(value).map_err(Error::serialization)
                })
                .transpose()
        });

        let activity = match &result {
            Ok(Some(_)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                CacheActivity::Hit
            }
            Ok(None) | Err(_) => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                CacheActivity::Miss
            }
        };
        let event = CacheEvent::new(CacheOperation::Get, activity)
            .tier(tier)
            .key(&key)
            .duration(stopwatch.elapsed());
        self.record_outcome(event, &result);
        result
    }

    /// Writes `value` under `key` following its resolved strategy.
    ///
    /// Returns `false` if the value could not be stored.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.set_with(key, value, &CacheOptions::default()).await
    }

    /// Writes `value` under `key` with per-call overrides.
    pub async fn set_with<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: &CacheOptions) -> bool {
        self.try_set_with(key, value, options).await.is_ok()
    }

    /// Writes `value` under `key`, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved TTL is zero, if `value` does not serialize,
    /// or if the tier call fails or times out.
    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.try_set_with(key, value, &CacheOptions::default()).await
    }

    /// Writes `value` under `key` with per-call overrides, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved TTL is zero, if `value` does not serialize,
    /// or if the tier call fails or times out.
    pub async fn try_set_with<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: &CacheOptions) -> Result<()> {
        let key = options.qualify(key);
        let strategy = self.inner.policy.resolve_with(&key, options);
        let (tier, storage) = self.route(strategy.storage_tier);
        let stopwatch = self.inner.clock.stopwatch();

        let result = self.store(storage, &key, value, strategy).await;

        let event = CacheEvent::new(CacheOperation::Set, CacheActivity::Inserted)
            .tier(tier)
            .key(&key)
            .duration(stopwatch.elapsed());
        self.record_outcome(event, &result);
        result
    }

    async fn store<T: Serialize + ?Sized>(
        &self,
        storage: &DynamicTier<Value>,
        key: &str,
        value: &T,
        strategy: CacheStrategy,
    ) -> Result<()> {
        if strategy.ttl.is_zero() {
            return Err(Error::invalid_input("ttl must be greater than zero"));
        }

        let value = serde_json::to_value(value).map_err(Error::serialization)?;
        let value = if strategy.compression {
            self.inner.codec.compress(value)
        } else {
            value
        };
        let entry = CacheEntry::new(value)
            .stamped(self.inner.clock.system_time(), strategy.ttl)
            .with_priority(strategy.priority);

        self.bounded(storage.insert(key, entry)).await
    }

    /// Returns `true` if `key` holds a live entry in the tier its strategy routes to.
    ///
    /// The check is a read of that tier: it refreshes the entry's recency in the
    /// memory tier and counts toward the tier's own hit and miss counters. It is not
    /// recorded in [`CacheStats`] or the event log.
    pub async fn contains(&self, key: &str) -> bool {
        self.contains_with(key, &CacheOptions::default()).await
    }

    /// Like [`contains`](Self::contains), with per-call overrides applied the same way
    /// [`get_with`](Self::get_with) applies them.
    pub async fn contains_with(&self, key: &str, options: &CacheOptions) -> bool {
        let key = options.qualify(key);
        let strategy = self.inner.policy.resolve_with(&key, options);
        let (_, storage) = self.route(strategy.storage_tier);
        matches!(self.bounded(storage.get(&key)).await, Ok(Some(_)))
    }

    /// Removes `key` from every tier.
    ///
    /// Returns `true` if any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let stopwatch = self.inner.clock.stopwatch();
        let results = join_all(
            self.tiers()
                .map(|(tier, storage)| async move { (tier, self.bounded(storage.invalidate(key)).await) }),
        )
        .await;

        let mut removed = false;
        for (tier, result) in &results {
            match result {
                Ok(found) => removed |= *found,
                Err(error) => {
                    let event = CacheEvent::new(CacheOperation::Delete, CacheActivity::Error).tier(*tier).key(key);
                    self.record_failure(event, error);
                }
            }
        }

        let activity = if removed { CacheActivity::Deleted } else { CacheActivity::Miss };
        self.record(&CacheEvent::new(CacheOperation::Delete, activity).key(key).duration(stopwatch.elapsed()));
        removed
    }

    /// Removes every entry in `scope` from every tier.
    ///
    /// Returns `false` if any tier failed.
    pub async fn clear(&self, scope: ClearScope) -> bool {
        let stopwatch = self.inner.clock.stopwatch();
        let scope = &scope;
        let results = join_all(self.tiers().map(|(tier, storage)| async move {
            let result = match scope {
                ClearScope::All => self.bounded(storage.clear()).await,
                ClearScope::Namespace(prefix) => self.bounded(storage.clear_namespace(prefix)).await.map(drop),
            };
            (tier, result)
        }))
        .await;

        let label = match scope {
            ClearScope::All => None,
            ClearScope::Namespace(prefix) => Some(prefix.as_str()),
        };

        let mut cleared = true;
        for (tier, result) in &results {
            let mut event = CacheEvent::new(CacheOperation::Clear, CacheActivity::Cleared)
                .tier(*tier)
                .duration(stopwatch.elapsed());
            event.key = label;
            cleared &= result.is_ok();
            self.record_outcome(event, result);
        }
        cleared
    }

    /// Registers `source` for keys starting with `prefix`.
    ///
    /// When several prefixes match a key, the longest wins. Registering the same
    /// prefix again replaces the earlier source.
    pub fn register_data_source(&self, prefix: impl Into<String>, source: impl DataSource) {
        self.inner.sources.write().register(prefix.into(), Arc::new(source));
    }

    /// Fetches every key from its data source and stores it.
    ///
    /// Keys are loaded concurrently. A key without a source, or whose fetch or write
    /// fails, is skipped. Returns the number of keys stored.
    pub async fn preload<I>(&self, keys: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let loads = keys.into_iter().map(|key| self.preload_key(key.into()));
        join_all(loads).await.into_iter().filter(|loaded| *loaded).count()
    }

    async fn preload_key(&self, key: String) -> bool {
        let source = self.inner.sources.read().resolve(&key);
        let Some(source) = source else {
            self.record(&CacheEvent::new(CacheOperation::Preload, CacheActivity::Skipped).key(&key));
            return false;
        };

        let stopwatch = self.inner.clock.stopwatch();
        let result = match self.bounded(source.fetch(&key)).await {
            Ok(value) => self.try_set(&key, &value).await,
            Err(error) => Err(error),
        };

        let event = CacheEvent::new(CacheOperation::Preload, CacheActivity::Loaded)
            .key(&key)
            .duration(stopwatch.elapsed());
        self.record_outcome(event, &result);
        result.is_ok()
    }

    /// Returns a snapshot of every configured tier and of the cache's read counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let stats = CacheStats {
            memory: self.inner.memory.stats(),
            persistent_sync: self.inner.persistent_sync.as_ref().map(|tier| tier.stats()),
            persistent_async: self.inner.persistent_async.as_ref().map(|tier| tier.stats()),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        };
        for (tier, tier_stats) in stats.tiers() {
            self.inner.telemetry.record_size(self.inner.name, tier, tier_stats.usage());
        }
        stats
    }

    /// Runs one maintenance pass.
    ///
    /// Expired entries are swept from every tier first. Then every tier whose usage
    /// ratio is at or above the enforcement ratio is pruned down to the target ratio
    /// of its capacity. A failing tier is reported as degraded and skipped.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let stopwatch = self.inner.clock.stopwatch();
        let config = self.inner.maintenance;
        let now = self.inner.clock.system_time();

        let mut records = Vec::with_capacity(StorageTier::ALL.len());
        for (tier, storage) in self.tiers() {
            let mut record = TierMaintenance::new(tier);
            let event = CacheEvent::new(CacheOperation::Maintenance, CacheActivity::Expired).tier(tier);
            match self.bounded(storage.clean_expired(now)).await {
                Ok(0) => {}
                Ok(expired) => {
                    record.expired = expired;
                    self.record(&event);
                }
                Err(error) => {
                    record.degraded = true;
                    self.record_failure(event, &error);
                }
            }
            records.push(record);
        }

        for (record, (tier, storage)) in records.iter_mut().zip(self.tiers()) {
            let stats = storage.stats();
            record.usage_before = stats.usage();
            record.usage_after = stats.usage();
            if stats.capacity() == 0 || stats.usage_ratio() < config.enforce_ratio {
                continue;
            }

            let event = CacheEvent::new(CacheOperation::Maintenance, CacheActivity::Evicted).tier(tier);
            match self.bounded(storage.prune(stats.target_for(config.target_ratio))).await {
                Ok(evicted) => {
                    record.evicted = evicted;
                    record.usage_after = storage.stats().usage();
                    self.record(&event);
                }
                Err(error) => {
                    record.degraded = true;
                    self.record_failure(event, &error);
                }
            }
        }

        self.record(&CacheEvent::new(CacheOperation::Maintenance, CacheActivity::Ok).duration(stopwatch.elapsed()));
        MaintenanceReport { tiers: records }
    }

    /// Starts running [`run_maintenance`](Self::run_maintenance) in the background.
    ///
    /// Each pass waits for the configured interval after the previous one finished,
    /// so passes never overlap. The loop ends when the returned handle is dropped or
    /// when every handle to the cache is gone.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use = "dropping the handle stops the maintenance loop"]
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        let cache = Arc::downgrade(&self.inner);
        let clock = self.inner.clock.clone();
        let interval = self.inner.maintenance.interval;
        MaintenanceHandle::new(tokio::spawn(maintenance_loop(cache, clock, interval)))
    }

    /// Preloads the critical keys of `plan`, then schedules its idle keys.
    ///
    /// Returns once the critical wave has finished. The idle wave starts after the
    /// plan's idle delay on a background task. Failures in either wave are skipped.
    ///
    /// # Panics
    ///
    /// Panics if the plan has idle keys and this is called outside of a Tokio runtime.
    pub async fn warm_up(&self, plan: WarmUp) -> WarmUpHandle {
        let (critical, idle, idle_delay) = plan.into_parts();
        let critical_loaded = self.preload(critical).await;

        let idle = (!idle.is_empty()).then(|| {
            let cache = self.clone();
            tokio::spawn(async move {
                cache.inner.clock.delay(idle_delay).await;
                cache.preload(idle).await
            })
        });

        WarmUpHandle::new(critical_loaded, idle)
    }

    fn tier(&self, tier: StorageTier) -> Option<&DynamicTier<Value>> {
        match tier {
            StorageTier::Memory => Some(&self.inner.memory),
            StorageTier::PersistentSync => self.inner.persistent_sync.as_ref(),
            StorageTier::PersistentAsync => self.inner.persistent_async.as_ref(),
        }
    }

    fn tiers(&self) -> impl Iterator<Item = (StorageTier, &DynamicTier<Value>)> {
        StorageTier::ALL
            .into_iter()
            .filter_map(|tier| self.tier(tier).map(|storage| (tier, storage)))
    }

    fn route(&self, requested: StorageTier) -> (StorageTier, &DynamicTier<Value>) {
        match self.tier(requested) {
            Some(storage) => (requested, storage),
            None => (StorageTier::Memory, &self.inner.memory),
        }
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match self.inner.operation_timeout {
            Some(limit) => operation.timeout(&self.inner.clock, limit).await.map_err(Error::timeout)?,
            None => operation.await,
        }
    }

    fn record(&self, event: &CacheEvent<'_>) {
        self.inner.telemetry.record(self.inner.name, event);
    }

    fn record_outcome<T>(&self, event: CacheEvent<'_>, result: &Result<T>) {
        match result {
            Ok(_) => self.record(&event),
            Err(error) => self.record_failure(event, error),
        }
    }

    fn record_failure(&self, event: CacheEvent<'_>, error: &Error) {
        let activity = match error.kind() {
            ErrorKind::Serialization | ErrorKind::InvalidInput => CacheActivity::Error,
            _ => CacheActivity::Degraded,
        };
        self.record(&CacheEvent { activity, ..event }.error(error));
    }
}

async fn maintenance_loop(cache: Weak<CacheInner>, clock: Clock, interval: Duration) {
    loop {
        clock.delay(interval).await;
        let Some(inner) = cache.upgrade() else {
            break;
        };
        UnifiedCache { inner }.run_maintenance().await;
    }
}

#[cfg(test)]
mod tests {
    use colcache_tier::testing::{MockTier, TierOp};
    use futures::executor::block_on;

    use super::*;
    use crate::telemetry::testing::LogCapture;

    #[test]
    fn failing_tier_logs_degraded_warning() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let tier = MockTier::<Value>::new();
        tier.fail_when(|op| matches!(op, TierOp::Get(_)));
        let cache = UnifiedCache::builder(Clock::new_frozen()).name("trip_cache").persistent_sync(tier).build();

        assert!(block_on(cache.get::<u32>("col:izoard")).is_none());

        capture.assert_contains("WARN");
        capture.assert_contains("trip_cache");
        capture.assert_contains("cache.degraded");
        capture.assert_contains("persistent-sync");
        capture.assert_contains("col:izoard");
    }

    #[test]
    fn rejected_write_logs_error() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let cache = UnifiedCache::builder(Clock::new_frozen()).build();
        let options = CacheOptions::new().ttl(colcache_tier::Ttl::from_millis(0));

        assert!(!block_on(cache.set_with("weather:paris", &18, &options)));

        capture.assert_contains("ERROR");
        capture.assert_contains("cache.error");
    }

    #[test]
    fn hits_and_writes_are_logged_at_their_levels() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let cache = UnifiedCache::builder(Clock::new_frozen()).build();

        assert!(block_on(cache.set("weather:paris", &18)));
        assert_eq!(block_on(cache.get::<u32>("weather:paris")), Some(18));

        capture.assert_contains("cache.inserted");
        capture.assert_contains("cache.hit");
        capture.assert_contains("INFO");
        capture.assert_contains("DEBUG");
    }

    #[test]
    fn disabled_logs_stay_silent() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let cache = UnifiedCache::builder(Clock::new_frozen()).logs(false).build();

        assert!(block_on(cache.set("weather:paris", &18)));
        assert!(block_on(cache.get::<u32>("weather:lyon")).is_none());

        assert!(!capture.output().contains("cache.event"));
    }

    #[test]
    fn route_falls_back_to_memory() {
        let cache = UnifiedCache::builder(Clock::new_frozen()).build();
        assert!(!cache.has_tier(StorageTier::PersistentAsync));
        assert_eq!(cache.route(StorageTier::PersistentAsync).0, StorageTier::Memory);
        assert_eq!(cache.tiers().count(), 1);
    }

    #[test]
    fn delete_counts_nothing_as_miss() {
        let cache = UnifiedCache::builder(Clock::new_frozen()).build();
        assert!(!block_on(cache.delete("search:nothing")));
        assert_eq!(cache.stats().misses, 0);
    }
}
