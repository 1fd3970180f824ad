// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Byte-accounted index of persisted entries.

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use colcache_tier::{Expiry, NAMESPACE_DELIMITERS, Priority, namespace_of};

/// Percentage of the byte budget that eviction brings usage down to.
pub const EVICTION_TARGET_PERCENT: u64 = 70;

/// Returns [`EVICTION_TARGET_PERCENT`] of `budget`.
#[must_use]
pub fn eviction_target(budget: u64) -> u64 {
    budget.saturating_mul(EVICTION_TARGET_PERCENT) / 100
}

/// What the index knows about one stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Approximate stored size.
    pub bytes: u64,
    /// Eviction priority.
    pub priority: Priority,
    /// Last read, else write, time.
    pub last_used: SystemTime,
    /// Absolute expiry.
    pub expiry: Expiry,
}

/// Size, priority and recency of every entry in a persistent tier.
///
/// Keys are additionally grouped by namespace so prefix scans touch only the
/// matching namespaces.
#[derive(Debug, Default)]
pub struct EvictionIndex {
    entries: HashMap<String, IndexedEntry>,
    namespaces: HashMap<String, BTreeSet<String>>,
    total_bytes: u64,
}

impl EvictionIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces `key`.
    pub fn record(&mut self, key: &str, entry: IndexedEntry) {
        match self.entries.insert(key.to_string(), entry) {
            Some(old) => self.total_bytes = self.total_bytes.saturating_sub(old.bytes),
            None => {
                self.namespaces
                    .entry(namespace_of(key).to_string())
                    .or_default()
                    .insert(key.to_string());
            }
        }
        self.total_bytes = self.total_bytes.saturating_add(entry.bytes);
    }

    /// Removes `key`, returning what was known about it.
    pub fn remove(&mut self, key: &str) -> Option<IndexedEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.bytes);
        let namespace = namespace_of(key);
        if let Some(keys) = self.namespaces.get_mut(namespace) {
            keys.remove(key);
            if keys.is_empty() {
                self.namespaces.remove(namespace);
            }
        }
        Some(entry)
    }

    /// Marks `key` as used at `now`.
    pub fn touch(&mut self, key: &str, now: SystemTime) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_used = now;
        }
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.namespaces.clear();
        self.total_bytes = 0;
    }

    /// Returns the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&IndexedEntry> {
        self.entries.get(key)
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the sizes of all indexed entries.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Every indexed key.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Keys that start with `prefix`, in sorted order within each namespace.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        if prefix.contains(NAMESPACE_DELIMITERS) {
            // Every matching key shares the prefix's namespace exactly.
            return self
                .namespaces
                .get(namespace_of(prefix))
                .map(|keys| keys.iter().filter(|key| key.starts_with(prefix)).cloned().collect())
                .unwrap_or_default();
        }

        self.namespaces
            .iter()
            .filter(|(namespace, _)| namespace.starts_with(prefix))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Keys expired at `now`.
    #[must_use]
    pub fn expired_keys(&self, now: SystemTime) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.expiry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Keys to evict, in order, so that usage drops to `target_bytes` or below.
    ///
    /// Candidates are ordered by priority rank and then by last use, oldest first.
    /// `protect` is never selected.
    #[must_use]
    pub fn eviction_plan(&self, target_bytes: u64, protect: Option<&str>) -> Vec<String> {
        if self.total_bytes <= target_bytes {
            return Vec::new();
        }

        let mut candidates: Vec<(&String, &IndexedEntry)> = self
            .entries
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != protect)
            .collect();
        candidates.sort_by(|(a_key, a), (b_key, b)| {
            (a.priority.rank(), a.last_used, a_key.as_str()).cmp(&(b.priority.rank(), b.last_used, b_key.as_str()))
        });

        let mut remaining = self.total_bytes;
        let mut plan = Vec::new();
        for (key, entry) in candidates {
            if remaining <= target_bytes {
                break;
            }
            remaining = remaining.saturating_sub(entry.bytes);
            plan.push(key.clone());
        }
        plan
    }
}
