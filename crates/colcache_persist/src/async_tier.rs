// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent tier over an asynchronous [`DocumentDatabase`].

use std::fmt;
use std::marker::PhantomData;
use std::time::SystemTime;

use async_once_cell::OnceCell;
use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, Error, Result, TierCounters, TierStats};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tick::Clock;

use crate::document::{DocumentCollection, DocumentDatabase, DocumentRecord};
use crate::index::{EvictionIndex, IndexedEntry, eviction_target};
use crate::record::{PersistedEntry, entry_size};

/// Default byte budget of the asynchronous tier, 50 MiB.
pub const DEFAULT_ASYNC_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Default number of documents read per cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Builder for an [`AsyncPersistentTier`].
#[derive(Debug)]
pub struct AsyncPersistentTierBuilder<D, V> {
    database: D,
    max_bytes: u64,
    page_size: usize,
    name: String,
    _value: PhantomData<fn() -> V>,
}

impl<D: DocumentDatabase, V> AsyncPersistentTierBuilder<D, V> {
    /// Sets the byte budget. Defaults to 50 MiB.
    #[must_use]
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Sets how many documents each cursor page reads. Zero is raised to one.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the tier. The database is not opened until the first operation.
    #[must_use]
    pub fn build(self, clock: Clock) -> AsyncPersistentTier<D, V> {
        AsyncPersistentTier {
            database: self.database,
            collection: OnceCell::new(),
            index: Mutex::new(EvictionIndex::new()),
            counters: Mutex::new(TierCounters::default()),
            max_bytes: self.max_bytes,
            page_size: self.page_size,
            name: self.name,
            clock,
            _value: PhantomData,
        }
    }
}

/// A persistent tier storing one document per key in a [`DocumentDatabase`].
///
/// The database is opened once, on first use, no matter how many calls race to use
/// it. If opening fails the tier logs a warning and degrades: reads miss, writes
/// and pruning fail with [`ErrorKind::Unavailable`](colcache_tier::ErrorKind::Unavailable),
/// clears are no-ops, and [`CacheTier::is_available`] returns `false`.
///
/// Namespace clears and expiry sweeps walk the collection with a key-ordered cursor
/// and delete in a second pass, so no cursor is open while documents are removed.
///
/// # Examples
///
/// ```
/// use colcache_persist::{AsyncPersistentTier, MemoryDocumentDatabase};
/// use colcache_tier::{CacheEntry, CacheTier};
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let database = MemoryDocumentDatabase::new();
/// let tier = AsyncPersistentTier::<_, String>::builder(database.clone()).build(Clock::new_frozen());
///
/// tier.insert("terrain:vercors", CacheEntry::new("tiles".to_string())).await.unwrap();
/// assert_eq!(database.open_count(), 1);
/// assert_eq!(database.len(), 1);
/// # });
/// ```
pub struct AsyncPersistentTier<D: DocumentDatabase, V> {
    database: D,
    collection: OnceCell<Option<D::Collection>>,
    index: Mutex<EvictionIndex>,
    counters: Mutex<TierCounters>,
    max_bytes: u64,
    page_size: usize,
    name: String,
    clock: Clock,
    _value: PhantomData<fn() -> V>,
}

impl<D: DocumentDatabase, V> fmt::Debug for AsyncPersistentTier<D, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPersistentTier")
            .field("name", &self.name)
            .field("max_bytes", &self.max_bytes)
            .field("page_size", &self.page_size)
            .field("available", &self.is_open_or_pending())
            .finish_non_exhaustive()
    }
}

impl<D: DocumentDatabase, V> AsyncPersistentTier<D, V> {
    /// Creates a builder over `database`.
    #[must_use]
    pub fn builder(database: D) -> AsyncPersistentTierBuilder<D, V> {
        AsyncPersistentTierBuilder {
            database,
            max_bytes: DEFAULT_ASYNC_MAX_BYTES,
            page_size: DEFAULT_PAGE_SIZE,
            name: "persistent-async".to_string(),
            _value: PhantomData,
        }
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &D {
        &self.database
    }

    /// The byte budget.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn is_open_or_pending(&self) -> bool {
        !matches!(self.collection.get(), Some(None))
    }

    async fn collection(&self) -> Option<&D::Collection> {
        self.collection.get_or_init(self.open()).await.as_ref()
    }

    async fn open(&self) -> Option<D::Collection> {
        let collection = match self.database.open().await {
            Ok(collection) => collection,
            Err(e) => {
                tracing::warn!(cache.tier = %self.name, error = %e, "document store unavailable, persistent tier disabled");
                return None;
            }
        };

        match self.load_index(&collection).await {
            Ok(index) => {
                tracing::debug!(cache.tier = %self.name, entries = index.len(), usage_bytes = index.total_bytes(), "document store opened");
                *self.index.lock() = index;
            }
            Err(e) => {
                tracing::warn!(cache.tier = %self.name, error = %e, "cannot index document store, starting with an empty index");
            }
        }
        Some(collection)
    }

    async fn load_index(&self, collection: &D::Collection) -> Result<EvictionIndex> {
        let mut index = EvictionIndex::new();
        let mut after: Option<String> = None;
        loop {
            let page = collection.scan(after.as_deref(), self.page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.key.clone());
            for document in &page {
                index.record(&document.key, indexed(document)?);
            }
        }
        Ok(index)
    }

    /// Walks the collection in key order, collecting the keys `select` accepts.
    ///
    /// `stop` ends the walk early once a key is past every possible match.
    async fn collect_keys(
        &self,
        collection: &D::Collection,
        mut select: impl FnMut(&DocumentRecord) -> bool + Send,
        mut stop: impl FnMut(&str) -> bool + Send,
    ) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = collection.scan(after.as_deref(), self.page_size).await?;
            let Some(last) = page.last() else {
                return Ok(keys);
            };
            after = Some(last.key.clone());
            for document in &page {
                if stop(&document.key) {
                    return Ok(keys);
                }
                if select(document) {
                    keys.push(document.key.clone());
                }
            }
        }
    }

    async fn scan_prefix(&self, collection: &D::Collection, prefix: &str) -> Result<Vec<String>> {
        self.collect_keys(
            collection,
            |document| document.key.starts_with(prefix),
            |key| key > prefix && !key.starts_with(prefix),
        )
        .await
    }

    /// Lists the stored keys starting with `prefix`, in key order.
    ///
    /// Returns an empty list when the database is unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be scanned.
    pub async fn keys_starting_with(&self, prefix: &str) -> Result<Vec<String>> {
        match self.collection().await {
            Some(collection) => self.scan_prefix(collection, prefix).await,
            None => Ok(Vec::new()),
        }
    }

    async fn delete_keys(&self, collection: &D::Collection, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            let existed = collection.delete(key).await?;
            self.index.lock().remove(key);
            if existed {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn evict_to(&self, collection: &D::Collection, target_bytes: u64, protect: Option<&str>) -> Result<u64> {
        let plan = self.index.lock().eviction_plan(target_bytes, protect);
        let evicted = self.delete_keys(collection, &plan).await?;
        if evicted > 0 {
            self.counters.lock().evictions += evicted;
            let usage_bytes = self.index.lock().total_bytes();
            tracing::info!(cache.tier = %self.name, evicted, usage_bytes, target_bytes, "evicted persistent documents");
        }
        Ok(evicted)
    }

    async fn put(&self, collection: &D::Collection, document: DocumentRecord, bytes: u64) -> Result<()> {
        match collection.put(document.clone()).await {
            Err(e) if e.is_quota_exceeded() => {
                tracing::info!(cache.tier = %self.name, cache.key = %document.key, "storage quota exceeded, evicting and retrying once");
                let target = eviction_target(self.max_bytes).saturating_sub(bytes);
                self.evict_to(collection, target, Some(&document.key)).await?;
                collection.put(document).await
            }
            other => other,
        }
    }

    fn unavailable(&self) -> Error {
        Error::unavailable(format!("document store of tier {} failed to open", self.name))
    }

    fn miss(&self) {
        self.counters.lock().misses += 1;
    }
}

fn indexed(document: &DocumentRecord) -> Result<IndexedEntry> {
    let raw = serde_json::to_string(&document.value).map_err(Error::serialization)?;
    Ok(IndexedEntry {
        bytes: entry_size(&document.key, &raw),
        priority: document.value.priority.unwrap_or_default(),
        last_used: document.value.last_used(),
        expiry: document.value.expiry,
    })
}

impl<D, V> CacheTier<V> for AsyncPersistentTier<D, V>
where
    D: DocumentDatabase,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let Some(collection) = self.collection().await else {
            self.miss();
            return Ok(None);
        };
        let now = self.clock.system_time();

        let Some(document) = collection.get(key).await? else {
            self.index.lock().remove(key);
            self.miss();
            return Ok(None);
        };

        if document.value.is_expired_at(now) {
            collection.delete(key).await?;
            self.index.lock().remove(key);
            let mut counters = self.counters.lock();
            counters.expirations += 1;
            counters.misses += 1;
            return Ok(None);
        }

        let record = match document.value.try_map(serde_json::from_value::<V>) {
            Ok(record) => record,
            Err(e) => {
                collection.delete(key).await?;
                self.index.lock().remove(key);
                self.miss();
                return Err(Error::serialization(e));
            }
        };

        self.index.lock().touch(key, now);
        self.counters.lock().hits += 1;
        let mut entry = record.into_entry();
        entry.record_access(now);
        Ok(Some(entry))
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        let Some(collection) = self.collection().await else {
            return Err(self.unavailable());
        };
        let now = self.clock.system_time();

        let record = PersistedEntry::from_entry(entry, now)
            .try_map(serde_json::to_value)
            .map_err(Error::serialization)?;
        let document = DocumentRecord {
            key: key.to_string(),
            value: record,
        };
        let indexed_entry = IndexedEntry {
            last_used: now,
            ..indexed(&document)?
        };

        self.put(collection, document, indexed_entry.bytes).await?;
        let over_budget = {
            let mut index = self.index.lock();
            index.record(key, indexed_entry);
            index.total_bytes() > self.max_bytes
        };

        if over_budget {
            self.evict_to(collection, eviction_target(self.max_bytes), Some(key)).await?;
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        let Some(collection) = self.collection().await else {
            return Ok(false);
        };
        let existed = collection.delete(key).await?;
        self.index.lock().remove(key);
        Ok(existed)
    }

    async fn clear(&self) -> Result<()> {
        let Some(collection) = self.collection().await else {
            return Ok(());
        };
        collection.clear().await?;
        self.index.lock().clear();
        Ok(())
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64> {
        let Some(collection) = self.collection().await else {
            return Ok(0);
        };
        let keys = self.scan_prefix(collection, prefix).await?;
        self.delete_keys(collection, &keys).await
    }

    async fn clean_expired(&self, now: SystemTime) -> Result<u64> {
        let Some(collection) = self.collection().await else {
            return Ok(0);
        };
        let keys = self
            .collect_keys(collection, |document| document.value.is_expired_at(now), |_| false)
            .await?;
        let removed = self.delete_keys(collection, &keys).await?;
        self.counters.lock().expirations += removed;
        Ok(removed)
    }

    async fn prune(&self, target: u64) -> Result<u64> {
        let Some(collection) = self.collection().await else {
            return Err(self.unavailable());
        };
        self.evict_to(collection, target, None).await
    }

    fn stats(&self) -> TierStats {
        if !self.is_open_or_pending() {
            return TierStats::unavailable(CapacityUnit::Bytes);
        }
        let index = self.index.lock();
        TierStats::new(CapacityUnit::Bytes, index.len() as u64, self.max_bytes, index.total_bytes())
            .with_counters(*self.counters.lock())
    }

    fn is_available(&self) -> bool {
        self.is_open_or_pending()
    }
}
