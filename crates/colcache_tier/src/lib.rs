// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core storage tier abstractions for the colcache tiered cache.
//!
//! This crate defines the [`CacheTier`] trait that every storage backend satisfies
//! (memory, synchronous persistent, asynchronous persistent), along with
//! [`CacheEntry`] for storing values with expiry and eviction metadata, and the
//! [`Error`] type shared by all fallible tier operations.
//!
//! # Overview
//!
//! Tiers own their entries exclusively. The orchestrator in `colcache` never holds
//! entries itself; it resolves a strategy for a key and routes the call to one tier.
//! Every tier honors the same contract:
//!
//! - a missing key is never an error, it is reported as `None`/`false`/`0`,
//! - an entry whose [`Expiry`] has passed is treated as absent on every read path,
//! - bulk operations ([`CacheTier::clear_namespace`], [`CacheTier::clean_expired`],
//!   [`CacheTier::prune`]) report how many entries they removed.
//!
//! # Implementing a Cache Tier
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Mutex;
//! use std::time::SystemTime;
//!
//! use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, Error, TierStats};
//!
//! struct SimpleTier<V>(Mutex<HashMap<String, CacheEntry<V>>>);
//!
//! impl<V: Clone + Send + Sync> CacheTier<V> for SimpleTier<V> {
//!     async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>, Error> {
//!         Ok(self.0.lock().unwrap().get(key).cloned())
//!     }
//!
//!     async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<(), Error> {
//!         self.0.lock().unwrap().insert(key.to_string(), entry);
//!         Ok(())
//!     }
//!
//!     async fn invalidate(&self, key: &str) -> Result<bool, Error> {
//!         Ok(self.0.lock().unwrap().remove(key).is_some())
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.lock().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     async fn clear_namespace(&self, prefix: &str) -> Result<u64, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         let before = map.len();
//!         map.retain(|key, _| !key.starts_with(prefix));
//!         Ok((before - map.len()) as u64)
//!     }
//!
//!     async fn clean_expired(&self, now: SystemTime) -> Result<u64, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         let before = map.len();
//!         map.retain(|_, entry| !entry.is_expired_at(now));
//!         Ok((before - map.len()) as u64)
//!     }
//!
//!     async fn prune(&self, _target: u64) -> Result<u64, Error> {
//!         Ok(0)
//!     }
//!
//!     fn stats(&self) -> TierStats {
//!         let size = self.0.lock().unwrap().len() as u64;
//!         TierStats::new(CapacityUnit::Entries, size, u64::MAX, size)
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic-tier` feature (on by default) for [`DynamicTier`], which wraps
//! any `CacheTier` in a cloneable, type-erased container. The orchestrator uses it to
//! hold heterogeneous backends side by side.

mod entry;
pub mod error;
mod expiry;
mod key;
mod priority;
mod stats;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
pub(crate) mod tier;

#[cfg(any(test, feature = "dynamic-tier"))]
mod dynamic;

#[cfg(any(test, feature = "dynamic-tier"))]
#[doc(inline)]
pub use dynamic::{DynamicTier, DynamicTierExt};
#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use expiry::{Expiry, Ttl, system_time_from_millis, system_time_to_millis};
#[doc(inline)]
pub use key::{NAMESPACE_DELIMITERS, namespace_of};
#[doc(inline)]
pub use priority::Priority;
#[doc(inline)]
pub use stats::{CapacityUnit, TierCounters, TierStats};
#[doc(inline)]
pub use tier::CacheTier;
