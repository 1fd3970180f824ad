// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;

use colcache_memory::DEFAULT_MAX_CAPACITY;
use colcache_persist::{DEFAULT_ASYNC_MAX_BYTES, DEFAULT_KEY_PREFIX, DEFAULT_PAGE_SIZE, DEFAULT_SYNC_MAX_BYTES};
use serde::{Deserialize, Serialize};

use crate::maintenance::MaintenanceConfig;
use crate::policy::CacheStrategy;

/// Deserializable settings for a [`UnifiedCache`](crate::UnifiedCache).
///
/// Every field is optional in the serialized form and falls back to the
/// builder's default. Apply with
/// [`UnifiedCacheBuilder::config`](crate::UnifiedCacheBuilder::config).
///
/// # Examples
///
/// ```
/// use colcache::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(
///     r#"{
///         "memoryCapacity": 250,
///         "syncMaxBytes": 1048576,
///         "operationTimeoutMs": 2000,
///         "policies": {
///             "segment": { "storageTier": "persistent-sync", "ttl": 3600000, "compression": true, "priority": "medium" }
///         }
///     }"#,
/// )
/// .unwrap();
///
/// assert_eq!(config.memory_capacity, 250);
/// assert!(config.policies.contains_key("segment"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Entry capacity of the memory tier.
    pub memory_capacity: usize,
    /// Byte budget of the synchronous persistent tier.
    pub sync_max_bytes: u64,
    /// Byte budget of the asynchronous persistent tier.
    pub async_max_bytes: u64,
    /// Prefix of every key the synchronous tier writes to its store.
    pub key_prefix: String,
    /// Page size of cursor scans over the document database.
    pub page_size: usize,
    /// Maintenance schedule and thresholds.
    pub maintenance: MaintenanceConfig,
    /// Upper bound in milliseconds on a single tier call, unbounded when absent.
    pub operation_timeout_ms: Option<u64>,
    /// Whether operations emit `tracing` events.
    pub logs: bool,
    /// Strategies by namespace, layered over the built-in categories.
    pub policies: HashMap<String, CacheStrategy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MAX_CAPACITY,
            sync_max_bytes: DEFAULT_SYNC_MAX_BYTES,
            async_max_bytes: DEFAULT_ASYNC_MAX_BYTES,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            maintenance: MaintenanceConfig::default(),
            operation_timeout_ms: None,
            logs: true,
            policies: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use colcache_tier::{Priority, Ttl};

    use super::*;
    use crate::policy::StorageTier;

    #[test]
    fn empty_object_is_default() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert!(config.logs);
        assert_eq!(config.key_prefix, "colcache:");
    }

    #[test]
    fn policies_deserialize() {
        let config: CacheConfig = serde_json::from_str(
            r#"{ "policies": { "climb": { "storageTier": "memory", "ttl": null, "compression": false, "priority": "high" } } }"#,
        )
        .unwrap();

        assert_eq!(
            config.policies["climb"],
            CacheStrategy::new(StorageTier::Memory, Ttl::Infinite, false, Priority::High)
        );
    }
}
