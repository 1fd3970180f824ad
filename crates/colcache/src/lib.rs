// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A policy-driven tiered cache for route, terrain, weather and training data.
//!
//! [`UnifiedCache`] puts three kinds of storage behind one API:
//!
//! - an in-process LRU tier bounded by entry count,
//! - a synchronous key-value tier bounded by bytes, and
//! - an asynchronous document tier bounded by bytes and opened lazily.
//!
//! Every key resolves through a [`PolicyTable`] to a [`CacheStrategy`] from its
//! namespace, the text before the first `:` or `_`. The strategy picks the tier,
//! the time to live, whether the value is compressed, and its eviction priority.
//! [`CacheOptions`] override it per call.
//!
//! # Quick Start
//!
//! ```
//! use colcache::{ClearScope, UnifiedCache};
//! use colcache_persist::{MemoryDocumentDatabase, MemoryKeyValueStore};
//! use serde_json::json;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let cache = UnifiedCache::builder(Clock::new_frozen())
//!     .key_value_store(MemoryKeyValueStore::new())
//!     .document_database(MemoryDocumentDatabase::new())
//!     .build();
//!
//! cache.set("weather:briancon", &json!({ "temp": 14, "wind": "NW" })).await;
//! cache.set("terrain:ecrins", &vec![1_u32, 2, 3]).await;
//!
//! let weather: Option<serde_json::Value> = cache.get("weather:briancon").await;
//! assert_eq!(weather.unwrap()["temp"], 14);
//!
//! cache.clear(ClearScope::namespace("weather")).await;
//! assert!(cache.get::<serde_json::Value>("weather:briancon").await.is_none());
//! assert_eq!(cache.get::<Vec<u32>>("terrain:ecrins").await, Some(vec![1, 2, 3]));
//! # });
//! ```
//!
//! # Failure Model
//!
//! A miss, an expired entry and a failing tier look the same through
//! [`UnifiedCache::get`] and [`UnifiedCache::set`]: `None` and `false`. The
//! `try_` variants return [`Error`] with an [`ErrorKind`] instead. Tier calls can be
//! bounded with [`UnifiedCacheBuilder::operation_timeout`].
//!
//! # Preloading
//!
//! Data sources are registered per key prefix with
//! [`UnifiedCache::register_data_source`]. [`UnifiedCache::preload`] fetches and
//! stores keys through them, and [`UnifiedCache::warm_up`] runs a critical wave
//! immediately and an idle wave after a delay.
//!
//! # Maintenance
//!
//! [`UnifiedCache::run_maintenance`] sweeps expired entries from every tier and
//! prunes tiers that reached the enforcement ratio of their capacity.
//! [`UnifiedCache::start_maintenance`] repeats it on a Tokio task.
//!
//! # Telemetry
//!
//! Operations emit `tracing` events named `cache.event` with `cache.name`,
//! `cache.operation`, `cache.activity`, `cache.tier`, `cache.key` and
//! `cache.duration_ns` fields. With the `metrics` feature the same events are
//! counted through OpenTelemetry, see `UnifiedCacheBuilder::metrics`.

mod builder;
mod cache;
mod config;
mod maintenance;
mod policy;
mod source;
mod stats;
mod telemetry;
mod warm_up;

#[doc(inline)]
pub use builder::UnifiedCacheBuilder;
#[doc(inline)]
pub use cache::{CacheName, ClearScope, UnifiedCache};
#[doc(inline)]
pub use colcache_codec::Codec;
#[doc(inline)]
pub use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, Error, ErrorKind, Priority, Result, TierCounters, TierStats, Ttl};
#[doc(inline)]
pub use config::CacheConfig;
#[doc(inline)]
pub use maintenance::{
    DEFAULT_ENFORCE_RATIO, DEFAULT_MAINTENANCE_INTERVAL, DEFAULT_TARGET_RATIO, MIN_MAINTENANCE_INTERVAL, MaintenanceConfig,
    MaintenanceHandle, MaintenanceReport, TierMaintenance,
};
#[doc(inline)]
pub use policy::{CacheOptions, CacheStrategy, PolicyTable, StorageTier};
#[doc(inline)]
pub use source::DataSource;
#[doc(inline)]
pub use stats::CacheStats;
#[doc(inline)]
pub use warm_up::{DEFAULT_IDLE_DELAY, WarmUp, WarmUpHandle};
