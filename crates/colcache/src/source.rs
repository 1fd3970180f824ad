// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Data sources used to preload keys.

use std::fmt;
use std::sync::Arc;

use colcache_tier::{Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

/// Fetches the value of a key from its origin, such as a weather or route API.
///
/// Implemented for every `Fn(String) -> impl Future<Output = Result<Value, E>>`
/// closure, so most sources are registered as plain async closures.
///
/// # Examples
///
/// ```
/// use colcache::DataSource;
/// use serde_json::{Value, json};
///
/// fn elevation_source() -> impl DataSource {
///     |key: String| async move { Ok::<Value, std::io::Error>(json!({ "key": key, "meters": 2642 })) }
/// }
/// ```
pub trait DataSource: Send + Sync + 'static {
    /// Fetches `key`.
    fn fetch(&self, key: &str) -> BoxFuture<'static, Result<Value>>;
}

impl<F, Fut, E> DataSource for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn fetch(&self, key: &str) -> BoxFuture<'static, Result<Value>> {
        self(key.to_string()).map(|result| result.map_err(Error::data_source)).boxed()
    }
}

/// Registered data sources, matched by the longest key prefix.
#[derive(Clone, Default)]
pub(crate) struct DataSources {
    sources: Vec<(String, Arc<dyn DataSource>)>,
}

impl fmt::Debug for DataSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.sources.iter().map(|(prefix, _)| prefix)).finish()
    }
}

impl DataSources {
    /// Registers `source` for keys starting with `prefix`, replacing any source
    /// registered for the same prefix.
    pub fn register(&mut self, prefix: String, source: Arc<dyn DataSource>) {
        match self.sources.iter_mut().find(|(existing, _)| *existing == prefix) {
            Some(slot) => slot.1 = source,
            None => self.sources.push((prefix, source)),
        }
    }

    /// Returns the source with the longest prefix of `key`.
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn DataSource>> {
        self.sources
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, source)| Arc::clone(source))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sources.len()
    }
}
