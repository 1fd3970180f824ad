// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`UnifiedCache`].

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use colcache_codec::Codec;
use colcache_memory::{DEFAULT_MAX_CAPACITY, MemoryTierBuilder};
use colcache_persist::{
    AsyncPersistentTier, DEFAULT_ASYNC_MAX_BYTES, DEFAULT_KEY_PREFIX, DEFAULT_PAGE_SIZE, DEFAULT_SYNC_MAX_BYTES, DocumentDatabase,
    KeyValueStore, SyncPersistentTier,
};
use colcache_tier::{CacheTier, DynamicTier, DynamicTierExt};
use parking_lot::RwLock;
use serde_json::Value;
use tick::Clock;

use crate::cache::{CacheInner, CacheName, UnifiedCache};
use crate::config::CacheConfig;
use crate::maintenance::MaintenanceConfig;
use crate::policy::{CacheStrategy, PolicyTable};
use crate::source::DataSources;
use crate::telemetry::CacheTelemetry;

const DEFAULT_NAME: CacheName = "colcache";

/// Settings the persistent tiers are built with, resolved at [`UnifiedCacheBuilder::build`].
#[derive(Debug, Clone)]
struct PersistSettings {
    sync_max_bytes: u64,
    async_max_bytes: u64,
    key_prefix: String,
    page_size: usize,
}

type TierFactory = Box<dyn FnOnce(CacheName, &PersistSettings, &Clock) -> DynamicTier<Value> + Send>;

enum Backend {
    Ready(DynamicTier<Value>),
    Deferred(TierFactory),
}

impl Backend {
    fn build(self, name: CacheName, settings: &PersistSettings, clock: &Clock) -> DynamicTier<Value> {
        match self {
            Self::Ready(tier) => tier,
            Self::Deferred(factory) => factory(name, settings, clock),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(tier) => f.debug_tuple("Ready").field(tier).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Configures and builds a [`UnifiedCache`].
///
/// Created by [`UnifiedCache::builder`]. Only the memory tier is present by
/// default; persistent tiers are added with [`key_value_store`](Self::key_value_store)
/// and [`document_database`](Self::document_database), or as ready-made tiers with
/// [`persistent_sync`](Self::persistent_sync) and [`persistent_async`](Self::persistent_async).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use colcache::{CacheStrategy, StorageTier, UnifiedCache};
/// use colcache_persist::{MemoryDocumentDatabase, MemoryKeyValueStore};
/// use colcache_tier::{Priority, Ttl};
/// use tick::Clock;
///
/// let cache = UnifiedCache::builder(Clock::new_frozen())
///     .name("trip_cache")
///     .memory_capacity(500)
///     .key_value_store(MemoryKeyValueStore::new())
///     .sync_max_bytes(2 * 1024 * 1024)
///     .document_database(MemoryDocumentDatabase::new())
///     .strategy(
///         "segment",
///         CacheStrategy::new(StorageTier::PersistentSync, Ttl::from_secs(3_600), true, Priority::Medium),
///     )
///     .operation_timeout(Duration::from_secs(2))
///     .build();
///
/// assert!(cache.has_tier(StorageTier::PersistentAsync));
/// assert_eq!(cache.name(), "trip_cache");
/// ```
#[derive(Debug)]
pub struct UnifiedCacheBuilder {
    clock: Clock,
    name: CacheName,
    memory_capacity: usize,
    memory: Option<DynamicTier<Value>>,
    persistent_sync: Option<Backend>,
    persistent_async: Option<Backend>,
    settings: PersistSettings,
    policy: PolicyTable,
    codec: Codec,
    maintenance: MaintenanceConfig,
    operation_timeout: Option<Duration>,
    logs: bool,
    #[cfg(feature = "metrics")]
    metrics: Option<crate::telemetry::metrics::CacheMetrics>,
}

impl UnifiedCacheBuilder {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            name: DEFAULT_NAME,
            memory_capacity: DEFAULT_MAX_CAPACITY,
            memory: None,
            persistent_sync: None,
            persistent_async: None,
            settings: PersistSettings {
                sync_max_bytes: DEFAULT_SYNC_MAX_BYTES,
                async_max_bytes: DEFAULT_ASYNC_MAX_BYTES,
                key_prefix: DEFAULT_KEY_PREFIX.to_string(),
                page_size: DEFAULT_PAGE_SIZE,
            },
            policy: PolicyTable::with_defaults(),
            codec: Codec::new(),
            maintenance: MaintenanceConfig::default(),
            operation_timeout: None,
            logs: true,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Sets the name reported in logs and metrics.
    #[must_use]
    pub fn name(mut self, name: CacheName) -> Self {
        self.name = name;
        self
    }

    /// Sets the entry capacity of the built-in memory tier.
    #[must_use]
    pub fn memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// Replaces the built-in memory tier.
    #[must_use]
    pub fn memory<T>(mut self, tier: T) -> Self
    where
        T: CacheTier<Value> + 'static,
    {
        self.memory = Some(tier.into_dynamic());
        self
    }

    /// Uses `tier` as the synchronous persistent tier.
    #[must_use]
    pub fn persistent_sync<T>(mut self, tier: T) -> Self
    where
        T: CacheTier<Value> + 'static,
    {
        self.persistent_sync = Some(Backend::Ready(tier.into_dynamic()));
        self
    }

    /// Builds the synchronous persistent tier over `store`.
    ///
    /// The tier uses the byte budget and key prefix set on this builder.
    #[must_use]
    pub fn key_value_store<S>(mut self, store: S) -> Self
    where
        S: KeyValueStore + 'static,
    {
        self.persistent_sync = Some(Backend::Deferred(Box::new(move |name, settings, clock| {
            SyncPersistentTier::<S, Value>::builder(store)
                .max_bytes(settings.sync_max_bytes)
                .key_prefix(settings.key_prefix.clone())
                .name(format!("{name}.persistent-sync"))
                .build(clock.clone())
                .into_dynamic()
        })));
        self
    }

    /// Uses `tier` as the asynchronous persistent tier.
    #[must_use]
    pub fn persistent_async<T>(mut self, tier: T) -> Self
    where
        T: CacheTier<Value> + 'static,
    {
        self.persistent_async = Some(Backend::Ready(tier.into_dynamic()));
        self
    }

    /// Builds the asynchronous persistent tier over `database`.
    ///
    /// The database is opened on first use. The tier uses the byte budget and page
    /// size set on this builder.
    #[must_use]
    pub fn document_database<D>(mut self, database: D) -> Self
    where
        D: DocumentDatabase + 'static,
    {
        self.persistent_async = Some(Backend::Deferred(Box::new(move |name, settings, clock| {
            AsyncPersistentTier::<D, Value>::builder(database)
                .max_bytes(settings.async_max_bytes)
                .page_size(settings.page_size)
                .name(format!("{name}.persistent-async"))
                .build(clock.clone())
                .into_dynamic()
        })));
        self
    }

    /// Sets the byte budget of a synchronous tier built from a store.
    #[must_use]
    pub fn sync_max_bytes(mut self, max_bytes: u64) -> Self {
        self.settings.sync_max_bytes = max_bytes;
        self
    }

    /// Sets the byte budget of an asynchronous tier built from a database.
    #[must_use]
    pub fn async_max_bytes(mut self, max_bytes: u64) -> Self {
        self.settings.async_max_bytes = max_bytes;
        self
    }

    /// Sets the prefix a synchronous tier built from a store writes its keys under.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.key_prefix = prefix.into();
        self
    }

    /// Sets the page size of cursor scans over a document database.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.settings.page_size = page_size;
        self
    }

    /// Replaces the policy table. Defaults to [`PolicyTable::with_defaults`].
    #[must_use]
    pub fn policy(mut self, policy: PolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the strategy of one namespace.
    #[must_use]
    pub fn strategy(mut self, namespace: impl Into<String>, strategy: CacheStrategy) -> Self {
        self.policy = self.policy.insert(namespace, strategy);
        self
    }

    /// Replaces the codec used for strategies with compression.
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the maintenance schedule and thresholds.
    ///
    /// The config is [normalized](MaintenanceConfig::normalized), so a zero interval
    /// runs at [`MIN_MAINTENANCE_INTERVAL`](crate::MIN_MAINTENANCE_INTERVAL).
    #[must_use]
    pub fn maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance.normalized();
        self
    }

    /// Bounds every tier call and data source fetch. A call that takes longer fails
    /// with [`ErrorKind::Timeout`](colcache_tier::ErrorKind::Timeout).
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Enables or disables `tracing` events. Enabled by default.
    #[must_use]
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = enabled;
        self
    }

    /// Records cache events, durations and tier usage through `meter_provider`.
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn metrics(mut self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        let meter = crate::telemetry::metrics::create_meter(meter_provider);
        self.metrics = Some(crate::telemetry::metrics::CacheMetrics::new(&meter));
        self
    }

    /// Applies every setting in `config`.
    ///
    /// Strategies in the config are layered over the current policy table.
    #[must_use]
    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.memory_capacity = config.memory_capacity;
        self.settings = PersistSettings {
            sync_max_bytes: config.sync_max_bytes,
            async_max_bytes: config.async_max_bytes,
            key_prefix: config.key_prefix.clone(),
            page_size: config.page_size,
        };
        self.maintenance = config.maintenance.normalized();
        self.operation_timeout = config.operation_timeout_ms.map(Duration::from_millis);
        self.logs = config.logs;
        for (namespace, strategy) in &config.policies {
            self.policy = self.policy.insert(namespace.clone(), *strategy);
        }
        self
    }

    /// Builds the cache.
    ///
    /// Synchronous tiers built from a store read the store's keys here.
    #[must_use]
    pub fn build(self) -> UnifiedCache {
        let name = self.name;
        let memory = self.memory.unwrap_or_else(|| {
            MemoryTierBuilder::<Value>::new()
                .max_capacity(self.memory_capacity)
                .name(format!("{name}.memory"))
                .build(self.clock.clone())
                .into_dynamic()
        });
        let persistent_sync = self
            .persistent_sync
            .map(|backend| backend.build(name, &self.settings, &self.clock));
        let persistent_async = self
            .persistent_async
            .map(|backend| backend.build(name, &self.settings, &self.clock));

        let telemetry = CacheTelemetry::new(self.logs);
        #[cfg(feature = "metrics")]
        let telemetry = match self.metrics {
            Some(metrics) => telemetry.with_metrics(metrics),
            None => telemetry,
        };

        UnifiedCache::from_inner(CacheInner {
            name,
            clock: self.clock,
            policy: self.policy,
            codec: self.codec,
            memory,
            persistent_sync,
            persistent_async,
            sources: RwLock::new(DataSources::default()),
            maintenance: self.maintenance,
            operation_timeout: self.operation_timeout,
            telemetry,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }
}
