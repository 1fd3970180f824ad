// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Fixed-capacity LRU engine and the in-memory colcache tier.
//!
//! [`LruCache`] is a generic least-recently-used map with O(1) get, set and delete
//! and lazy per-entry expiry. [`MemoryTier`] adapts it to the
//! [`CacheTier`](colcache_tier::CacheTier) contract.
//!
//! # Quick Start
//!
//! ```
//! use colcache_memory::MemoryTierBuilder;
//! use colcache_tier::{CacheEntry, CacheTier, Ttl};
//! use tick::Clock;
//!
//! # futures::executor::block_on(async {
//! let clock = Clock::new_frozen();
//! let tier = MemoryTierBuilder::<String>::new().max_capacity(3).build(clock.clone());
//!
//! let entry = CacheEntry::new("sunny".to_string()).stamped(clock.system_time(), Ttl::from_secs(60));
//! tier.insert("weather:paris", entry).await.unwrap();
//! assert!(tier.get("weather:paris").await.unwrap().is_some());
//! # });
//! ```

pub mod builder;
mod lru;
pub mod tier;

#[doc(inline)]
pub use builder::{DEFAULT_MAX_CAPACITY, MemoryTierBuilder};
#[doc(inline)]
pub use lru::{Iter, LruCache, LruStats};
#[doc(inline)]
pub use tier::MemoryTier;
