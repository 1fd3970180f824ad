// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent tier over a synchronous [`KeyValueStore`].

use std::marker::PhantomData;
use std::time::SystemTime;

use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, Error, Result, TierCounters, TierStats};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tick::Clock;

use crate::index::{EvictionIndex, IndexedEntry, eviction_target};
use crate::kv::KeyValueStore;
use crate::record::{PersistedEntry, entry_size};

/// Default storage key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "colcache:";

/// Default byte budget of the synchronous tier, 5 MiB.
pub const DEFAULT_SYNC_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Builder for a [`SyncPersistentTier`].
#[derive(Debug)]
pub struct SyncPersistentTierBuilder<S, V> {
    store: S,
    key_prefix: String,
    max_bytes: u64,
    name: String,
    _value: PhantomData<fn() -> V>,
}

impl<S: KeyValueStore, V> SyncPersistentTierBuilder<S, V> {
    /// Sets the prefix prepended to every key in the store. Defaults to `colcache:`.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the byte budget. Defaults to 5 MiB.
    #[must_use]
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the tier and indexes the entries already in the store.
    ///
    /// Records that cannot be parsed are removed. A store that cannot be listed
    /// starts with an empty index.
    #[must_use]
    pub fn build(self, clock: Clock) -> SyncPersistentTier<S, V> {
        let tier = SyncPersistentTier {
            store: self.store,
            key_prefix: self.key_prefix,
            max_bytes: self.max_bytes,
            name: self.name,
            clock,
            index: Mutex::new(EvictionIndex::new()),
            counters: Mutex::new(TierCounters::default()),
            _value: PhantomData,
        };
        tier.rebuild_index();
        tier
    }
}

/// A persistent tier storing one JSON record per key in a [`KeyValueStore`].
///
/// Usage is tracked in bytes against a budget. A write rejected by the store for
/// quota evicts down to 70% of the budget and is retried once. A write that leaves
/// usage above the budget evicts down to 70% as well, never evicting the key just
/// written.
///
/// # Examples
///
/// ```
/// use colcache_persist::{MemoryKeyValueStore, SyncPersistentTier};
/// use colcache_tier::{CacheEntry, CacheTier};
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let store = MemoryKeyValueStore::new();
/// let tier = SyncPersistentTier::<_, String>::builder(store.clone())
///     .max_bytes(64 * 1024)
///     .build(Clock::new_frozen());
///
/// tier.insert("route:galibier", CacheEntry::new("gpx".to_string())).await.unwrap();
/// assert_eq!(store.len(), 1);
/// assert!(tier.get("route:galibier").await.unwrap().is_some());
/// # });
/// ```
#[derive(Debug)]
pub struct SyncPersistentTier<S, V> {
    store: S,
    key_prefix: String,
    max_bytes: u64,
    name: String,
    clock: Clock,
    index: Mutex<EvictionIndex>,
    counters: Mutex<TierCounters>,
    _value: PhantomData<fn() -> V>,
}

impl<S: KeyValueStore, V> SyncPersistentTier<S, V> {
    /// Creates a builder over `store`.
    #[must_use]
    pub fn builder(store: S) -> SyncPersistentTierBuilder<S, V> {
        SyncPersistentTierBuilder {
            store,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_bytes: DEFAULT_SYNC_MAX_BYTES,
            name: "persistent-sync".to_string(),
            _value: PhantomData,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The byte budget.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    fn rebuild_index(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(cache.tier = %self.name, error = %e, "cannot list persistent store, starting empty");
                return;
            }
        };

        let mut index = self.index.lock();
        for storage_key in keys {
            let Some(key) = storage_key.strip_prefix(&self.key_prefix) else {
                continue;
            };
            let raw = match self.store.get_item(&storage_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(cache.tier = %self.name, cache.key = key, error = %e, "cannot read persisted entry");
                    continue;
                }
            };
            match serde_json::from_str::<PersistedEntry<IgnoredAny>>(&raw) {
                Ok(record) => index.record(key, indexed(&record, entry_size(&storage_key, &raw))),
                Err(e) => {
                    tracing::warn!(cache.tier = %self.name, cache.key = key, error = %e, "removing unreadable persisted entry");
                    if let Err(e) = self.store.remove_item(&storage_key) {
                        tracing::warn!(cache.tier = %self.name, cache.key = key, error = %e, "cannot remove unreadable persisted entry");
                    }
                }
            }
        }
    }

    /// Removes entries from the store and the index, returning how many were removed.
    fn remove_keys(&self, index: &mut EvictionIndex, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            self.store.remove_item(&self.storage_key(key))?;
            if index.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn evict_to(&self, index: &mut EvictionIndex, target_bytes: u64, protect: Option<&str>) -> Result<u64> {
        let plan = index.eviction_plan(target_bytes, protect);
        let evicted = self.remove_keys(index, &plan)?;
        if evicted > 0 {
            self.counters.lock().evictions += evicted;
            tracing::info!(
                cache.tier = %self.name,
                evicted,
                usage_bytes = index.total_bytes(),
                target_bytes,
                "evicted persistent entries"
            );
        }
        Ok(evicted)
    }

    /// Writes a record. A quota failure frees room for it below the eviction target
    /// and retries once.
    fn write(&self, index: &mut EvictionIndex, key: &str, storage_key: &str, raw: &str, bytes: u64) -> Result<()> {
        match self.store.set_item(storage_key, raw) {
            Err(e) if e.is_quota_exceeded() => {
                tracing::info!(cache.tier = %self.name, cache.key = key, "storage quota exceeded, evicting and retrying once");
                let target = eviction_target(self.max_bytes).saturating_sub(bytes);
                self.evict_to(index, target, Some(key))?;
                self.store.set_item(storage_key, raw)
            }
            other => other,
        }
    }
}

fn indexed<V>(record: &PersistedEntry<V>, bytes: u64) -> IndexedEntry {
    IndexedEntry {
        bytes,
        priority: record.priority.unwrap_or_default(),
        last_used: record.last_used(),
        expiry: record.expiry,
    }
}

impl<S, V> CacheTier<V> for SyncPersistentTier<S, V>
where
    S: KeyValueStore,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let now = self.clock.system_time();
        let storage_key = self.storage_key(key);

        let Some(raw) = self.store.get_item(&storage_key)? else {
            self.index.lock().remove(key);
            self.counters.lock().misses += 1;
            return Ok(None);
        };

        let record = match serde_json::from_str::<PersistedEntry<V>>(&raw) {
            Ok(record) => record,
            Err(e) => {
                self.store.remove_item(&storage_key)?;
                self.index.lock().remove(key);
                self.counters.lock().misses += 1;
                return Err(Error::serialization(e));
            }
        };

        if record.is_expired_at(now) {
            self.store.remove_item(&storage_key)?;
            self.index.lock().remove(key);
            let mut counters = self.counters.lock();
            counters.expirations += 1;
            counters.misses += 1;
            return Ok(None);
        }

        self.index.lock().touch(key, now);
        self.counters.lock().hits += 1;
        let mut entry = record.into_entry();
        entry.record_access(now);
        Ok(Some(entry))
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        let now = self.clock.system_time();
        let storage_key = self.storage_key(key);
        let record = PersistedEntry::from_entry(entry, now);
        let raw = serde_json::to_string(&record).map_err(Error::serialization)?;
        let bytes = entry_size(&storage_key, &raw);

        let mut index = self.index.lock();
        self.write(&mut index, key, &storage_key, &raw, bytes)?;
        index.record(
            key,
            IndexedEntry {
                last_used: now,
                ..indexed(&record, bytes)
            },
        );

        if index.total_bytes() > self.max_bytes {
            self.evict_to(&mut index, eviction_target(self.max_bytes), Some(key))?;
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        let storage_key = self.storage_key(key);
        let existed = self.store.get_item(&storage_key)?.is_some();
        self.store.remove_item(&storage_key)?;
        self.index.lock().remove(key);
        Ok(existed)
    }

    async fn clear(&self) -> Result<()> {
        let mut index = self.index.lock();
        for storage_key in self.store.keys()? {
            if storage_key.starts_with(&self.key_prefix) {
                self.store.remove_item(&storage_key)?;
            }
        }
        index.clear();
        Ok(())
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64> {
        let mut index = self.index.lock();
        let keys = index.keys_with_prefix(prefix);
        self.remove_keys(&mut index, &keys)
    }

    async fn clean_expired(&self, now: SystemTime) -> Result<u64> {
        let mut index = self.index.lock();
        let keys = index.expired_keys(now);
        let removed = self.remove_keys(&mut index, &keys)?;
        self.counters.lock().expirations += removed;
        Ok(removed)
    }

    async fn prune(&self, target: u64) -> Result<u64> {
        let mut index = self.index.lock();
        self.evict_to(&mut index, target, None)
    }

    fn stats(&self) -> TierStats {
        let index = self.index.lock();
        TierStats::new(CapacityUnit::Bytes, index.len() as u64, self.max_bytes, index.total_bytes())
            .with_counters(*self.counters.lock())
    }
}
