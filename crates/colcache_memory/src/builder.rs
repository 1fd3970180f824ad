// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory tiers.

use std::marker::PhantomData;

use tick::Clock;

use crate::tier::MemoryTier;

/// Default entry capacity of a memory tier.
pub const DEFAULT_MAX_CAPACITY: usize = 100;

/// Builder for a [`MemoryTier`].
///
/// # Examples
///
/// ```
/// use colcache_memory::MemoryTier;
/// use tick::Clock;
///
/// let tier = MemoryTier::<String>::builder()
///     .max_capacity(500)
///     .name("hot")
///     .build(Clock::new_frozen());
/// assert_eq!(tier.name(), "hot");
/// ```
#[derive(Debug)]
pub struct MemoryTierBuilder<V> {
    pub(crate) max_capacity: usize,
    pub(crate) name: Option<String>,
    _phantom: PhantomData<V>,
}

impl<V> Default for MemoryTierBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryTierBuilder<V> {
    /// Creates a builder with [`DEFAULT_MAX_CAPACITY`] entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            name: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of entries. Zero is raised to one.
    #[must_use]
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets the name used in logs.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the tier, reading time from `clock`.
    #[must_use]
    pub fn build(self, clock: Clock) -> MemoryTier<V> {
        MemoryTier::from_builder(self, clock)
    }
}
