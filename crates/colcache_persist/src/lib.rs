// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Persistent tiers of the colcache tiered cache.
//!
//! Two tiers implement [`CacheTier`](colcache_tier::CacheTier) over durable storage:
//!
//! - [`SyncPersistentTier`] writes one JSON record per key into a synchronous
//!   [`KeyValueStore`], evicting and retrying once when the store reports its quota
//!   is exhausted.
//! - [`AsyncPersistentTier`] writes one [`DocumentRecord`] per key into an
//!   asynchronous [`DocumentDatabase`] that is opened lazily, exactly once.
//!
//! Both keep an [`EvictionIndex`] of entry sizes, priorities and recency. Usage is
//! measured in bytes as `(key length + serialized length) * 2`, see [`entry_size`].
//! When usage passes the byte budget the lowest priority, least recently used
//! entries are evicted until usage is at [`EVICTION_TARGET_PERCENT`] of the budget.
//!
//! # Stored Format
//!
//! ```json
//! { "value": { "temp": 14 }, "expiry": 1700000060000, "timestamp": 1700000000000 }
//! ```
//!
//! `expiry` is `null` for entries that never expire. Optional `priority` and
//! `lastAccessed` fields are written alongside; records without them still load.

mod async_tier;
mod document;
mod index;
mod kv;
mod record;
mod sync_tier;

#[doc(inline)]
pub use async_tier::{AsyncPersistentTier, AsyncPersistentTierBuilder, DEFAULT_ASYNC_MAX_BYTES, DEFAULT_PAGE_SIZE};
#[doc(inline)]
pub use document::{
    DirectoryCollection, DirectoryDocumentDatabase, DocumentCollection, DocumentDatabase, DocumentRecord, MemoryCollection,
    MemoryDocumentDatabase,
};
#[doc(inline)]
pub use index::{EVICTION_TARGET_PERCENT, EvictionIndex, IndexedEntry, eviction_target};
#[doc(inline)]
pub use kv::{DirectoryKeyValueStore, KeyValueStore, MemoryKeyValueStore};
#[doc(inline)]
pub use record::{PersistedEntry, entry_size};
#[doc(inline)]
pub use sync_tier::{DEFAULT_KEY_PREFIX, DEFAULT_SYNC_MAX_BYTES, SyncPersistentTier, SyncPersistentTierBuilder};
