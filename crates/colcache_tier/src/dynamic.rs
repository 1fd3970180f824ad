// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type-erased tier wrapper.

use std::{fmt::Debug, sync::Arc, time::SystemTime};

use crate::{CacheEntry, CacheTier, Error, TierStats, tier::DynCacheTier};

/// Extension trait for converting any `CacheTier` into a `DynamicTier`.
///
/// # Examples
///
/// ```
/// use colcache_tier::{CacheTier, DynamicTier, DynamicTierExt};
///
/// fn erase<T>(tier: T) -> DynamicTier<String>
/// where
///     T: CacheTier<String> + 'static,
/// {
///     tier.into_dynamic()
/// }
/// ```
pub trait DynamicTierExt<V>: Sized {
    /// Converts this tier into a `DynamicTier`.
    fn into_dynamic(self) -> DynamicTier<V>;
}

impl<V, T> DynamicTierExt<V> for T
where
    T: CacheTier<V> + 'static,
{
    fn into_dynamic(self) -> DynamicTier<V> {
        DynamicTier::new(self)
    }
}

/// A cloneable, type-erased tier.
///
/// The orchestrator holds its memory, synchronous persistent and asynchronous
/// persistent backends as `DynamicTier` values so that each can be any concrete type.
pub struct DynamicTier<V>(Arc<DynCacheTier<'static, V>>);

impl<V> DynamicTier<V> {
    /// Wraps any `CacheTier` implementation.
    pub fn new<T>(tier: T) -> Self
    where
        T: CacheTier<V> + 'static,
    {
        Self(DynCacheTier::new_arc(tier))
    }
}

impl<V> Debug for DynamicTier<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTier").field("stats", &self.0.stats()).finish()
    }
}

impl<V> Clone for DynamicTier<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V: Send> CacheTier<V> for DynamicTier<V> {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>, Error> {
        self.0.get(key).await
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<(), Error> {
        self.0.insert(key, entry).await
    }

    async fn invalidate(&self, key: &str) -> Result<bool, Error> {
        self.0.invalidate(key).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }

    async fn clear_namespace(&self, prefix: &str) -> Result<u64, Error> {
        self.0.clear_namespace(prefix).await
    }

    async fn clean_expired(&self, now: SystemTime) -> Result<u64, Error> {
        self.0.clean_expired(now).await
    }

    async fn prune(&self, target: u64) -> Result<u64, Error> {
        self.0.prune(target).await
    }

    fn stats(&self) -> TierStats {
        self.0.stats()
    }

    fn is_available(&self) -> bool {
        self.0.is_available()
    }

    fn len(&self) -> u64 {
        self.0.len()
    }
}
