// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

use colcache_tier::{CacheEntry, Expiry, Priority, system_time_from_millis, system_time_to_millis};
use serde::{Deserialize, Serialize};

/// The stored form of one cache entry.
///
/// Serializes as `{"value": .., "expiry": <epoch ms | null>, "timestamp": <epoch ms>}`.
/// `priority` and `lastAccessed` are written when known and default when absent, so
/// records that carry only the three core fields still load.
///
/// # Examples
///
/// ```
/// use colcache_persist::PersistedEntry;
/// use serde_json::json;
///
/// let record: PersistedEntry<String> =
///     serde_json::from_value(json!({ "value": "sunny", "expiry": null, "timestamp": 1000 })).unwrap();
/// assert_eq!(record.value, "sunny");
/// assert!(record.priority.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry<V> {
    /// The cached value.
    pub value: V,
    /// Absolute expiry.
    #[serde(default)]
    pub expiry: Expiry,
    /// Write time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Eviction priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Last read time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<u64>,
}

impl<V> PersistedEntry<V> {
    /// Converts an entry for storage. An unstamped entry is timestamped with `now`.
    pub fn from_entry(entry: CacheEntry<V>, now: SystemTime) -> Self {
        let expiry = entry.expiry();
        let timestamp = system_time_to_millis(entry.created_at().unwrap_or(now));
        let priority = Some(entry.priority());
        let last_accessed = entry.last_accessed().map(system_time_to_millis);
        Self {
            value: entry.into_value(),
            expiry,
            timestamp,
            priority,
            last_accessed,
        }
    }

    /// Rebuilds the cache entry.
    pub fn into_entry(self) -> CacheEntry<V> {
        let entry = CacheEntry::new(self.value)
            .with_expiry(self.expiry)
            .with_created_at(system_time_from_millis(self.timestamp))
            .with_priority(self.priority.unwrap_or_default());
        match self.last_accessed {
            Some(millis) => entry.with_last_accessed(system_time_from_millis(millis)),
            None => entry,
        }
    }

    /// Converts the value, keeping the metadata.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `f`.
    pub fn try_map<U, E>(self, f: impl FnOnce(V) -> Result<U, E>) -> Result<PersistedEntry<U>, E> {
        Ok(PersistedEntry {
            value: f(self.value)?,
            expiry: self.expiry,
            timestamp: self.timestamp,
            priority: self.priority,
            last_accessed: self.last_accessed,
        })
    }

    /// Returns `true` when the record must be treated as absent at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.is_expired_at(now)
    }

    /// The time eviction ordering uses: the last read, else the write time.
    #[must_use]
    pub fn last_used(&self) -> SystemTime {
        system_time_from_millis(self.last_accessed.unwrap_or(self.timestamp))
    }
}

/// Approximate stored size of an entry in bytes: `(key length + serialized length) * 2`.
///
/// The factor two accounts for stores that keep strings as UTF-16.
#[must_use]
pub fn entry_size(key: &str, serialized: &str) -> u64 {
    (key.len() as u64).saturating_add(serialized.len() as u64).saturating_mul(2)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use colcache_tier::Ttl;
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_core_layout() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_millis(5_000);
        let entry = CacheEntry::new(json!({ "temp": 14 })).stamped(now, Ttl::from_millis(500));
        let record = PersistedEntry::from_entry(entry, now);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["value"], json!({ "temp": 14 }));
        assert_eq!(json["expiry"], json!(5_500));
        assert_eq!(json["timestamp"], json!(5_000));
        assert_eq!(json["priority"], json!("low"));
        assert!(json.get("lastAccessed").is_none());
    }

    #[test]
    fn round_trip_keeps_metadata() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let mut entry = CacheEntry::new(7_u32)
            .stamped(now, Ttl::Infinite)
            .with_priority(Priority::High);
        entry.record_access(now + Duration::from_secs(1));

        let restored = PersistedEntry::from_entry(entry, now).into_entry();
        assert_eq!(restored.expiry(), Expiry::Never);
        assert_eq!(restored.created_at(), Some(now));
        assert_eq!(restored.priority(), Priority::High);
        assert_eq!(restored.last_accessed(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn unstamped_entry_takes_now() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(3);
        let record = PersistedEntry::from_entry(CacheEntry::new(()), now);
        assert_eq!(record.timestamp, 3_000);
        assert_eq!(record.last_used(), now);
    }

    #[test]
    fn entry_size_doubles_key_and_payload() {
        assert_eq!(entry_size("abc", "12345"), 16);
    }
}
