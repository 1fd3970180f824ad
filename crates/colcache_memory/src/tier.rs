// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory tier backed by [`LruCache`].

use std::sync::Arc;
use std::time::SystemTime;

use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, Error, TierStats};
use parking_lot::Mutex;
use tick::Clock;

use crate::builder::MemoryTierBuilder;
use crate::lru::{LruCache, LruStats};

/// An in-memory tier holding at most a fixed number of entries.
///
/// Reads refresh recency and access metadata; expired entries are dropped on read.
/// Cloning shares the underlying storage.
///
/// # Examples
///
/// ```
/// use colcache_memory::MemoryTier;
/// use colcache_tier::{CacheEntry, CacheTier};
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let tier = MemoryTier::<i32>::builder().max_capacity(100).build(Clock::new_frozen());
///
/// tier.insert("col:galibier", CacheEntry::new(2642)).await.unwrap();
/// let value = tier.get("col:galibier").await.unwrap();
/// assert_eq!(*value.unwrap().value(), 2642);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTier<V> {
    inner: Arc<Mutex<LruCache<String, CacheEntry<V>>>>,
    clock: Clock,
    name: Arc<str>,
}

impl<V> MemoryTier<V> {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MemoryTierBuilder<V> {
        MemoryTierBuilder::new()
    }

    /// Creates a tier with the given entry capacity.
    #[must_use]
    pub fn new(max_capacity: usize, clock: Clock) -> Self {
        Self::builder().max_capacity(max_capacity).build(clock)
    }

    pub(crate) fn from_builder(builder: MemoryTierBuilder<V>, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(builder.max_capacity))),
            clock,
            name: Arc::from(builder.name.as_deref().unwrap_or("memory")),
        }
    }

    /// The tier name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the underlying LRU counters.
    #[must_use]
    pub fn lru_stats(&self) -> LruStats {
        self.inner.lock().stats()
    }

    /// Keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }
}

impl<V> CacheTier<V> for MemoryTier<V>
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>, Error> {
        let now = self.clock.system_time();
        let mut lru = self.inner.lock();
        Ok(lru.get_mut(key, now).map(|entry| {
            entry.record_access(now);
            entry.clone()
        }))
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<(), Error> {
        let expiry = entry.expiry();
        let evicted = self.inner.lock().set(key.to_string(), entry, expiry);
        if let Some((evicted_key, _)) = evicted {
            tracing::debug!(
                cache.tier = &*self.name,
                cache.key = evicted_key.as_str(),
                "evicted least recently used entry"
            );
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        Ok(self.inner.lock().delete(key))
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.lock().clear();
        Ok(())
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64, Error> {
        Ok(self.inner.lock().remove_matching(|key| key.starts_with(prefix)))
    }

    async fn clean_expired(&self, now: SystemTime) -> Result<u64, Error> {
        Ok(self.inner.lock().clean_expired(now))
    }

    async fn prune(&self, target: u64) -> Result<u64, Error> {
        let target = usize::try_from(target).unwrap_or(usize::MAX);
        Ok(self.inner.lock().prune(target))
    }

    fn stats(&self) -> TierStats {
        let stats = self.inner.lock().stats();
        let size = stats.size as u64;
        TierStats::new(CapacityUnit::Entries, size, stats.capacity as u64, size).with_counters(stats.counters())
    }
}
