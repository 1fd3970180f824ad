// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fixed-capacity least-recently-used map.
//!
//! Nodes live in a dense `Vec` and are linked into a doubly linked recency list by
//! index. Removal swaps the last node into the freed slot and patches its
//! neighbours, so the arena never has holes and every index in the map is valid.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::SystemTime;

use colcache_tier::{Expiry, TierCounters};

// Counts map lookups and link updates so tests can check per-operation cost.
macro_rules! probe {
    ($cache:expr) => {
        #[cfg(test)]
        {
            $cache.probes += 1;
        }
    };
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    expiry: Expiry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Occupancy and activity of an [`LruCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LruStats {
    /// Number of stored entries, including expired ones not yet removed.
    pub size: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Reads that returned a live entry.
    pub hits: u64,
    /// Reads that found nothing or an expired entry.
    pub misses: u64,
    /// Entries removed to respect capacity.
    pub evictions: u64,
    /// Entries removed because their expiry passed.
    pub expirations: u64,
}

impl LruStats {
    /// `hits / (hits + misses)`, or `0.0` before the first read.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        self.counters().hit_rate()
    }

    /// The activity counters alone.
    #[must_use]
    pub fn counters(&self) -> TierCounters {
        TierCounters {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expirations: self.expirations,
        }
    }
}

/// A fixed-capacity least-recently-used cache with per-entry expiry.
///
/// `get`, `set` and `remove` are O(1). The head of the recency list is the most
/// recently used entry; the tail is evicted first. Counters survive [`LruCache::clear`].
///
/// # Examples
///
/// ```
/// use colcache_memory::LruCache;
/// use colcache_tier::Expiry;
/// use std::time::SystemTime;
///
/// let now = SystemTime::UNIX_EPOCH;
/// let mut lru = LruCache::new(3);
/// lru.set("a", 1, Expiry::Never);
/// lru.set("b", 2, Expiry::Never);
/// lru.set("c", 3, Expiry::Never);
///
/// assert_eq!(lru.get("a", now), Some(&1));
/// lru.set("d", 4, Expiry::Never);
///
/// assert_eq!(lru.get("b", now), None);
/// assert_eq!(lru.stats().evictions, 1);
/// ```
#[derive(Debug)]
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
    counters: TierCounters,
    #[cfg(test)]
    probes: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::new(),
            nodes: Vec::new(),
            head: None,
            tail: None,
            capacity,
            counters: TierCounters::default(),
            #[cfg(test)]
            probes: 0,
        }
    }

    /// Returns the live value for `key` and marks it most recently used.
    ///
    /// An entry expired at `now` is removed and reported as a miss.
    pub fn get<Q>(&mut self, key: &Q, now: SystemTime) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_mut(key, now).map(|value| &*value)
    }

    /// Mutable variant of [`LruCache::get`], with the same accounting.
    pub fn get_mut<Q>(&mut self, key: &Q, now: SystemTime) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        probe!(self);
        let Some(&index) = self.map.get(key) else {
            self.counters.misses += 1;
            return None;
        };

        if self.nodes[index].expiry.is_expired_at(now) {
            self.remove_at(index);
            self.counters.expirations += 1;
            self.counters.misses += 1;
            return None;
        }

        self.touch(index);
        self.counters.hits += 1;
        Some(&mut self.nodes[index].value)
    }

    /// Returns the live value for `key` without touching recency or counters.
    pub fn peek<Q>(&self, key: &Q, now: SystemTime) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let node = &self.nodes[*self.map.get(key)?];
        (!node.expiry.is_expired_at(now)).then_some(&node.value)
    }

    /// Returns `true` if `key` is stored, expired or not.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts or replaces `key` and marks it most recently used.
    ///
    /// Replacing keeps the node and updates value and expiry in place. Inserting a new
    /// key into a full cache evicts exactly one entry, the least recently used, and
    /// returns it.
    pub fn set(&mut self, key: K, value: V, expiry: Expiry) -> Option<(K, V)> {
        probe!(self);
        if let Some(&index) = self.map.get(&key) {
            let node = &mut self.nodes[index];
            node.value = value;
            node.expiry = expiry;
            self.touch(index);
            return None;
        }

        let index = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            value,
            expiry,
            prev: None,
            next: None,
        });
        self.map.insert(key, index);
        self.push_front(index);

        if self.nodes.len() > self.capacity {
            return self.evict_tail();
        }
        None
    }

    /// Removes `key`, returning its value whether or not it had expired.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        probe!(self);
        let index = *self.map.get(key)?;
        Some(self.remove_at(index).value)
    }

    /// Removes `key`, returning `true` if it was stored.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Removes every entry whose key matches `predicate`, returning how many were removed.
    pub fn remove_matching(&mut self, mut predicate: impl FnMut(&K) -> bool) -> u64 {
        let doomed: Vec<K> = self
            .nodes
            .iter()
            .filter(|node| predicate(&node.key))
            .map(|node| node.key.clone())
            .collect();
        doomed.iter().filter(|key| self.delete(*key)).count() as u64
    }

    /// Removes every entry expired at `now`, returning how many were removed.
    pub fn clean_expired(&mut self, now: SystemTime) -> u64 {
        let doomed: Vec<K> = self
            .nodes
            .iter()
            .filter(|node| node.expiry.is_expired_at(now))
            .map(|node| node.key.clone())
            .collect();
        let removed = doomed.iter().filter(|key| self.delete(*key)).count() as u64;
        self.counters.expirations += removed;
        removed
    }

    /// Evicts least recently used entries until at most `target` remain.
    pub fn prune(&mut self, target: usize) -> u64 {
        let mut removed = 0;
        while self.nodes.len() > target {
            if self.evict_tail().is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet removed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of occupancy and counters.
    #[must_use]
    pub fn stats(&self) -> LruStats {
        LruStats {
            size: self.nodes.len(),
            capacity: self.capacity,
            hits: self.counters.hits,
            misses: self.counters.misses,
            evictions: self.counters.evictions,
            expirations: self.counters.expirations,
        }
    }

    /// `hits / (hits + misses)`, or `0.0` before the first read.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        self.counters.hit_rate()
    }

    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    fn evict_tail(&mut self) -> Option<(K, V)> {
        let index = self.tail?;
        let node = self.remove_at(index);
        self.counters.evictions += 1;
        Some((node.key, node.value))
    }

    fn touch(&mut self, index: usize) {
        if self.head != Some(index) {
            self.unlink(index);
            self.push_front(index);
        }
    }

    fn unlink(&mut self, index: usize) {
        probe!(self);
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[index].prev = None;
        self.nodes[index].next = None;
    }

    fn push_front(&mut self, index: usize) {
        probe!(self);
        self.nodes[index].prev = None;
        self.nodes[index].next = self.head;
        match self.head {
            Some(head) => self.nodes[head].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn remove_at(&mut self, index: usize) -> Node<K, V> {
        self.unlink(index);
        let node = self.nodes.swap_remove(index);
        self.map.remove(&node.key);

        // The former last node now sits at `index`; repoint everything that referenced it.
        if index < self.nodes.len() {
            probe!(self);
            let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
            match prev {
                Some(prev) => self.nodes[prev].next = Some(index),
                None => self.head = Some(index),
            }
            match next {
                Some(next) => self.nodes[next].prev = Some(index),
                None => self.tail = Some(index),
            }
            if let Some(slot) = self.map.get_mut(&self.nodes[index].key) {
                *slot = index;
            }
        }
        node
    }
}

/// Iterator over an [`LruCache`] in recency order.
#[derive(Debug)]
pub struct Iter<'a, K, V> {
    cache: &'a LruCache<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = &self.cache.nodes[self.cursor?];
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::*;

    fn t(millis: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
    }

    fn keys_of(lru: &LruCache<String, u32>) -> Vec<&str> {
        lru.keys().map(String::as_str).collect()
    }

    fn assert_consistent<K: Hash + Eq + Clone + std::fmt::Debug, V>(lru: &LruCache<K, V>) {
        assert_eq!(lru.map.len(), lru.nodes.len());
        let mut forward = 0;
        let mut cursor = lru.head;
        let mut prev = None;
        while let Some(index) = cursor {
            let node = &lru.nodes[index];
            assert_eq!(node.prev, prev, "broken back link at {:?}", node.key);
            assert_eq!(lru.map.get(&node.key), Some(&index));
            prev = Some(index);
            cursor = node.next;
            forward += 1;
        }
        assert_eq!(prev, lru.tail);
        assert_eq!(forward, lru.nodes.len());
    }

    #[test]
    fn capacity_three_evicts_least_recently_used() {
        let mut lru = LruCache::new(3);
        lru.set("a".to_string(), 1, Expiry::Never);
        lru.set("b".to_string(), 2, Expiry::Never);
        lru.set("c".to_string(), 3, Expiry::Never);
        assert_eq!(lru.get("a", t(0)), Some(&1));

        let evicted = lru.set("d".to_string(), 4, Expiry::Never);

        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert_eq!(lru.get("b", t(0)), None);
        assert_eq!(keys_of(&lru), ["d", "a", "c"]);
        let stats = lru.stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.evictions, 1);
        assert_consistent(&lru);
    }

    #[test]
    fn replacing_updates_in_place_without_eviction() {
        let mut lru = LruCache::new(2);
        lru.set("a".to_string(), 1, Expiry::Never);
        lru.set("b".to_string(), 2, Expiry::Never);
        assert_eq!(lru.set("a".to_string(), 10, Expiry::At(t(5))), None);

        assert_eq!(keys_of(&lru), ["a", "b"]);
        assert_eq!(lru.peek("a", t(0)), Some(&10));
        assert_eq!(lru.peek("a", t(5)), None);
        assert_eq!(lru.stats().evictions, 0);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let mut lru = LruCache::new(4);
        lru.set("k".to_string(), 1, Expiry::At(t(100)));

        assert_eq!(lru.get("k", t(99)), Some(&1));
        assert_eq!(lru.get("k", t(250)), None);

        let stats = lru.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn clear_keeps_counters() {
        let mut lru = LruCache::new(1);
        lru.set("a".to_string(), 1, Expiry::Never);
        lru.set("b".to_string(), 2, Expiry::Never);
        let _ = lru.get("b", t(0));
        lru.clear();

        let stats = lru.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hits, 1);
        assert!(lru.is_empty());
        assert_consistent(&lru);
    }

    #[test]
    fn remove_matching_and_clean_expired_report_counts() {
        let mut lru = LruCache::new(10);
        lru.set("weather:paris".to_string(), 1, Expiry::At(t(10)));
        lru.set("weather:lyon".to_string(), 2, Expiry::Never);
        lru.set("terrain:alps".to_string(), 3, Expiry::At(t(10)));

        assert_eq!(lru.remove_matching(|key| key.starts_with("weather")), 2);
        assert_eq!(keys_of(&lru), ["terrain:alps"]);
        assert_eq!(lru.clean_expired(t(10)), 1);
        assert_eq!(lru.stats().expirations, 1);
        assert_consistent(&lru);
    }

    #[test]
    fn prune_evicts_from_tail() {
        let mut lru = LruCache::new(10);
        for (i, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            lru.set(key.to_string(), u32::try_from(i).unwrap(), Expiry::Never);
        }
        assert_eq!(lru.prune(2), 3);
        assert_eq!(keys_of(&lru), ["e", "d"]);
        assert_eq!(lru.stats().evictions, 3);
        assert_eq!(lru.prune(5), 0);
    }

    #[test]
    fn hit_rate_without_reads_is_zero() {
        let lru = LruCache::<String, u32>::new(1);
        assert!(lru.hit_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut lru = LruCache::new(0);
        lru.set("a".to_string(), 1, Expiry::Never);
        assert_eq!(lru.capacity(), 1);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn operation_cost_does_not_grow_with_size() {
        fn cost_of_ops(size: usize) -> u64 {
            let mut lru = LruCache::new(size);
            for i in 0..size {
                lru.set(i, i, Expiry::Never);
            }
            lru.probes = 0;
            let _ = lru.get(&0, SystemTime::UNIX_EPOCH);
            lru.set(size, size, Expiry::Never);
            let _ = lru.remove(&(size / 2));
            lru.probes
        }

        assert_eq!(cost_of_ops(8), cost_of_ops(8_192));
    }

    #[test]
    fn matches_reference_model_for_random_sequences() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        for _ in 0..50 {
            let capacity = rng.usize(1..6);
            let mut lru = LruCache::new(capacity);
            // Front is most recently used.
            let mut model: VecDeque<(u8, u32)> = VecDeque::new();

            for step in 0..200_u32 {
                let key = rng.u8(0..8);
                match rng.u8(0..3) {
                    0 => {
                        lru.set(key, step, Expiry::Never);
                        if let Some(pos) = model.iter().position(|(k, _)| *k == key) {
                            model.remove(pos);
                        } else if model.len() == capacity {
                            model.pop_back();
                        }
                        model.push_front((key, step));
                    }
                    1 => {
                        let got = lru.get(&key, SystemTime::UNIX_EPOCH).copied();
                        let expected = model.iter().position(|(k, _)| *k == key).map(|pos| {
                            let item = model.remove(pos).unwrap();
                            model.push_front(item);
                            item.1
                        });
                        assert_eq!(got, expected);
                    }
                    _ => {
                        let removed = lru.delete(&key);
                        let pos = model.iter().position(|(k, _)| *k == key);
                        if let Some(pos) = pos {
                            model.remove(pos);
                        }
                        assert_eq!(removed, pos.is_some());
                    }
                }
                let order: Vec<u8> = lru.keys().copied().collect();
                let expected: Vec<u8> = model.iter().map(|(k, _)| *k).collect();
                assert_eq!(order, expected);
                assert_consistent(&lru);
            }
        }
    }
}
