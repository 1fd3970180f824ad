// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{ops::Deref, time::SystemTime};

use crate::{Expiry, Priority, Ttl};

/// A cached value with its expiry and eviction metadata.
///
/// Tiers store `CacheEntry` values as-is. The orchestrator stamps the entry with the
/// insertion time and an absolute [`Expiry`] computed from the resolved TTL before it
/// hands the entry to a tier.
///
/// # Examples
///
/// ```
/// use colcache_tier::{CacheEntry, Expiry, Priority, Ttl};
/// use std::time::{Duration, SystemTime};
///
/// let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
/// let entry = CacheEntry::new(42)
///     .stamped(now, Ttl::from_secs(60))
///     .with_priority(Priority::High);
///
/// assert_eq!(*entry.value(), 42);
/// assert_eq!(entry.created_at(), Some(now));
/// assert_eq!(entry.expiry(), Expiry::At(now + Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    expiry: Expiry,
    created_at: Option<SystemTime>,
    priority: Priority,
    access_count: u64,
    last_accessed: Option<SystemTime>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry that never expires, with low priority and no timestamp.
    ///
    /// ```
    /// use colcache_tier::{CacheEntry, Expiry};
    ///
    /// let entry = CacheEntry::new("data");
    /// assert_eq!(entry.expiry(), Expiry::Never);
    /// assert!(entry.created_at().is_none());
    /// ```
    pub fn new(value: V) -> Self {
        Self {
            value,
            expiry: Expiry::Never,
            created_at: None,
            priority: Priority::Low,
            access_count: 0,
            last_accessed: None,
        }
    }

    /// Sets the insertion time and derives the absolute expiry from `ttl`.
    ///
    /// Access tracking restarts from zero.
    #[must_use]
    pub fn stamped(mut self, now: SystemTime, ttl: Ttl) -> Self {
        self.created_at = Some(now);
        self.expiry = Expiry::from_ttl(now, ttl);
        self.access_count = 0;
        self.last_accessed = None;
        self
    }

    /// Replaces the absolute expiry.
    #[must_use]
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Replaces the insertion timestamp.
    ///
    /// Used when an entry is recreated from persistent storage.
    #[must_use]
    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Replaces the eviction priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Returns the absolute expiry.
    #[must_use]
    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    /// Returns the time the entry was written, if it has been stamped.
    #[must_use]
    pub fn created_at(&self) -> Option<SystemTime> {
        self.created_at
    }

    /// Returns the eviction priority.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Replaces the last access time.
    ///
    /// Used when an entry is recreated from persistent storage.
    #[must_use]
    pub fn with_last_accessed(mut self, last_accessed: SystemTime) -> Self {
        self.last_accessed = Some(last_accessed);
        self
    }

    /// Counts a successful read at `now`.
    pub fn record_access(&mut self, now: SystemTime) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(now);
    }

    /// Number of successful reads since the entry was written.
    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Time of the last successful read, if any.
    #[must_use]
    pub fn last_accessed(&self) -> Option<SystemTime> {
        self.last_accessed
    }

    /// The time eviction ordering should use: the last read, else the write time.
    #[must_use]
    pub fn last_used(&self) -> Option<SystemTime> {
        self.last_accessed.or(self.created_at)
    }

    /// Returns `true` when the entry must be treated as absent at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_expired_at(now)
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Converts the value while keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            expiry: self.expiry,
            created_at: self.created_at,
            priority: self.priority,
            access_count: self.access_count,
            last_accessed: self.last_accessed,
        }
    }

    /// Fallible version of [`CacheEntry::map`].
    ///
    /// # Errors
    ///
    /// Returns the error produced by `f`.
    pub fn try_map<U, E>(self, f: impl FnOnce(V) -> Result<U, E>) -> Result<CacheEntry<U>, E> {
        Ok(CacheEntry {
            value: f(self.value)?,
            expiry: self.expiry,
            created_at: self.created_at,
            priority: self.priority,
            access_count: self.access_count,
            last_accessed: self.last_accessed,
        })
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<V> From<V> for CacheEntry<V> {
    fn from(value: V) -> Self {
        Self::new(value)
    }
}
