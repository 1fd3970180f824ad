// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache storage backends.
//!
//! [`CacheTier`] defines the interface every backend implements. Keys are strings;
//! namespaces are key prefixes ending in `:` or `_`.

use std::time::SystemTime;

use crate::{CacheEntry, Error, TierStats};

/// Trait for storage tier implementations.
///
/// All bulk and point operations are required. A backend that cannot serve a call
/// (for example, a document store that failed to open) reports a miss or a no-op
/// rather than an error, and returns `false` from [`CacheTier::is_available`].
///
/// Read paths never return an entry whose expiry has passed.
#[cfg_attr(
    any(test, feature = "dynamic-tier"),
    dynosaur::dynosaur(pub(crate) DynCacheTier = dyn(box) CacheTier, bridge(none))
)]
pub trait CacheTier<V>: Send + Sync {
    /// Gets an entry, refreshing its recency.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry<V>>, Error>> + Send;

    /// Inserts or replaces an entry.
    fn insert(&self, key: &str, entry: CacheEntry<V>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes an entry, returning `true` if one was present.
    fn invalidate(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every entry.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes every entry whose key starts with `prefix`, returning how many were removed.
    fn clear_namespace(&self, prefix: &str) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Removes every entry expired at `now`, returning how many were removed.
    fn clean_expired(&self, now: SystemTime) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Evicts entries until usage is at or below `target`, returning how many were removed.
    ///
    /// `target` is in the unit reported by [`CacheTier::stats`].
    fn prune(&self, target: u64) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Returns an occupancy snapshot.
    fn stats(&self) -> TierStats;

    /// Returns `false` when the backend cannot serve requests in this runtime.
    fn is_available(&self) -> bool {
        true
    }

    /// Returns the number of live entries.
    fn len(&self) -> u64 {
        self.stats().size()
    }

    /// Returns `true` if the tier holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
