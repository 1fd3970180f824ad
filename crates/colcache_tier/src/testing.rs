// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock tier implementation for testing.
//!
//! [`MockTier`] keeps entries in a map, records every call, and fails calls that
//! match a caller-supplied predicate. It never consults a clock: reads return stored
//! entries regardless of expiry, and only [`CacheTier::clean_expired`] looks at it.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use parking_lot::Mutex;

use crate::{CacheEntry, CacheTier, CapacityUnit, Error, ErrorKind, TierStats};

/// Recorded tier operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOp<V> {
    /// `get` with the given key.
    Get(String),
    /// `insert` with the given key and entry.
    Insert {
        /// The key that was inserted.
        key: String,
        /// The entry that was inserted.
        entry: CacheEntry<V>,
    },
    /// `invalidate` with the given key.
    Invalidate(String),
    /// `clear`.
    Clear,
    /// `clear_namespace` with the given prefix.
    ClearNamespace(String),
    /// `clean_expired` at the given time.
    CleanExpired(SystemTime),
    /// `prune` down to the given target.
    Prune(u64),
}

type FailPredicate<V> = Box<dyn Fn(&TierOp<V>) -> bool + Send + Sync>;

/// A configurable mock tier for testing.
///
/// # Examples
///
/// ```ignore
/// use colcache_tier::{CacheEntry, CacheTier, testing::{MockTier, TierOp}};
///
/// # async fn example() {
/// let tier = MockTier::<i32>::new();
///
/// tier.insert("col:izoard", CacheEntry::new(2360)).await.unwrap();
/// let entry = tier.get("col:izoard").await.unwrap();
/// assert_eq!(*entry.unwrap().value(), 2360);
///
/// tier.fail_when(|op| matches!(op, TierOp::Get(_)));
/// assert!(tier.get("col:izoard").await.is_err());
/// # }
/// ```
pub struct MockTier<V> {
    data: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    operations: Arc<Mutex<Vec<TierOp<V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<V>>>>,
    fail_kind: Arc<Mutex<ErrorKind>>,
    available: Arc<Mutex<bool>>,
}

impl<V: std::fmt::Debug> std::fmt::Debug for MockTier<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTier")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MockTier<V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            fail_kind: Arc::clone(&self.fail_kind),
            available: Arc::clone(&self.available),
        }
    }
}

impl<V> Default for MockTier<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MockTier<V> {
    /// Creates an empty mock tier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            fail_kind: Arc::new(Mutex::new(ErrorKind::Storage)),
            available: Arc::new(Mutex::new(true)),
        }
    }

    /// Returns the number of stored entries, expired or not.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns `true` if the key is stored.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Sets what [`CacheTier::is_available`] reports.
    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    /// Sets the kind of error injected failures carry. Defaults to [`ErrorKind::Storage`].
    pub fn fail_with(&self, kind: ErrorKind) {
        *self.fail_kind.lock() = kind;
    }
}

impl<V: Clone> MockTier<V> {
    /// Sets a predicate that decides which operations fail.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&TierOp<V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<TierOp<V>> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn check(&self, op: TierOp<V>, what: &'static str) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        if fail {
            return Err(Error::caused_by(*self.fail_kind.lock(), what));
        }
        Ok(())
    }
}

impl<V> CacheTier<V> for MockTier<V>
where
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>, Error> {
        self.check(TierOp::Get(key.to_string()), "mock: get failed")?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<(), Error> {
        self.check(
            TierOp::Insert {
                key: key.to_string(),
                entry: entry.clone(),
            },
            "mock: insert failed",
        )?;
        self.data.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        self.check(TierOp::Invalidate(key.to_string()), "mock: invalidate failed")?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.check(TierOp::Clear, "mock: clear failed")?;
        self.data.lock().clear();
        Ok(())
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64, Error> {
        self.check(TierOp::ClearNamespace(prefix.to_string()), "mock: clear_namespace failed")?;
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|key, _| !key.starts_with(prefix));
        Ok((before - data.len()) as u64)
    }

    async fn clean_expired(&self, now: SystemTime) -> Result<u64, Error> {
        self.check(TierOp::CleanExpired(now), "mock: clean_expired failed")?;
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        Ok((before - data.len()) as u64)
    }

    async fn prune(&self, target: u64) -> Result<u64, Error> {
        self.check(TierOp::Prune(target), "mock: prune failed")?;
        let mut data = self.data.lock();
        let mut removed = 0;
        while data.len() as u64 > target {
            let Some(key) = data.keys().next().cloned() else {
                break;
            };
            data.remove(&key);
            removed += 1;
        }
        Ok(removed)
    }

    fn stats(&self) -> TierStats {
        let size = self.data.lock().len() as u64;
        TierStats::new(CapacityUnit::Entries, size, u64::MAX, size)
    }

    fn is_available(&self) -> bool {
        *self.available.lock()
    }
}
