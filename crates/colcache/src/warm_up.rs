// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Startup preload waves.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Default pause before the idle wave starts.
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(2);

/// Keys to preload when the cache starts.
///
/// Critical keys are loaded before [`UnifiedCache::warm_up`](crate::UnifiedCache::warm_up)
/// returns. Idle keys are loaded in the background once `idle_delay` has passed.
/// A failing key in either wave is skipped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use colcache::WarmUp;
///
/// let plan = WarmUp::new()
///     .critical(["weather:current", "col:galibier"])
///     .idle(["terrain:ecrins", "poi:refuges"])
///     .idle_delay(Duration::from_secs(5));
/// assert_eq!(plan.critical_keys().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmUp {
    critical: Vec<String>,
    idle: Vec<String>,
    idle_delay: Duration,
}

impl Default for WarmUp {
    fn default() -> Self {
        Self {
            critical: Vec::new(),
            idle: Vec::new(),
            idle_delay: DEFAULT_IDLE_DELAY,
        }
    }
}

impl WarmUp {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds keys to the critical wave.
    #[must_use]
    pub fn critical(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.critical.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds keys to the idle wave.
    #[must_use]
    pub fn idle(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.idle.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets the pause before the idle wave.
    #[must_use]
    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    /// Keys of the critical wave.
    #[must_use]
    pub fn critical_keys(&self) -> &[String] {
        &self.critical
    }

    /// Keys of the idle wave.
    #[must_use]
    pub fn idle_keys(&self) -> &[String] {
        &self.idle
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<String>, Duration) {
        (self.critical, self.idle, self.idle_delay)
    }
}

/// Progress of a started warm-up.
///
/// Dropping the handle leaves the idle wave running.
#[derive(Debug)]
pub struct WarmUpHandle {
    critical_loaded: usize,
    idle: Option<JoinHandle<usize>>,
}

impl WarmUpHandle {
    pub(crate) fn new(critical_loaded: usize, idle: Option<JoinHandle<usize>>) -> Self {
        Self { critical_loaded, idle }
    }

    /// Number of critical keys that were loaded.
    #[must_use]
    pub fn critical_loaded(&self) -> usize {
        self.critical_loaded
    }

    /// Waits for the idle wave and returns the number of keys it loaded.
    ///
    /// Returns `0` when there was no idle wave or it did not run to completion.
    pub async fn idle_loaded(self) -> usize {
        match self.idle {
            Some(task) => task.await.unwrap_or_default(),
            None => 0,
        }
    }
}
