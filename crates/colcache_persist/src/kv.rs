// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous string key-value stores.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colcache_tier::{Error, Result};
use parking_lot::Mutex;

use crate::record::entry_size;

/// A synchronous store of string values, such as browser-style local storage.
///
/// Writes that fail because the store is full must report
/// [`ErrorKind::QuotaExceeded`](colcache_tier::ErrorKind::QuotaExceeded) so that
/// the tier can evict and retry.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a quota error when the store is full, or another error if the write fails.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a value. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Lists every stored key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default)]
struct MemoryStoreState {
    items: BTreeMap<String, String>,
    used_bytes: u64,
    quota_bytes: Option<u64>,
}

/// An in-process [`KeyValueStore`] with an optional byte quota.
///
/// Usage is counted as `(key length + value length) * 2` bytes per item. Clones share
/// the same storage.
///
/// # Examples
///
/// ```
/// use colcache_persist::{KeyValueStore, MemoryKeyValueStore};
///
/// let store = MemoryKeyValueStore::with_quota(32);
/// store.set_item("a", "1234").unwrap();
/// let err = store.set_item("b", "a much longer value").unwrap_err();
/// assert!(err.is_quota_exceeded());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryKeyValueStore {
    /// Creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: u64) -> Self {
        let store = Self::new();
        store.state.lock().quota_bytes = Some(quota_bytes);
        store
    }

    /// Bytes currently used.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used_bytes
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        let old = state.items.get(key).map_or(0, |old| entry_size(key, old));
        let used = state.used_bytes.saturating_sub(old).saturating_add(entry_size(key, value));
        if state.quota_bytes.is_some_and(|quota| used > quota) {
            return Err(Error::quota_exceeded(format!("writing {key} would use {used} bytes")));
        }
        state.items.insert(key.to_string(), value.to_string());
        state.used_bytes = used;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(old) = state.items.remove(key) {
            state.used_bytes = state.used_bytes.saturating_sub(entry_size(key, &old));
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().items.keys().cloned().collect())
    }
}

/// A [`KeyValueStore`] that keeps one file per key in a directory.
///
/// File names are the hex encoding of the key, so any key is a valid name.
#[derive(Debug, Clone)]
pub struct DirectoryKeyValueStore {
    root: PathBuf,
}

impl DirectoryKeyValueStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(io_error)?;
        Ok(Self { root })
    }

    /// The directory holding the files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(hex_encode(key))
    }
}

impl KeyValueStore for DirectoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_of(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_of(key), value).map_err(io_error)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_of(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error(e)),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let dir_entry = dir_entry.map_err(io_error)?;
            if let Some(key) = dir_entry.file_name().to_str().and_then(hex_decode) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Maps an I/O error to a tier error, reporting full disks as quota errors.
pub(crate) fn io_error(error: io::Error) -> Error {
    match error.kind() {
        io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => Error::quota_exceeded(error),
        _ => Error::storage(error),
    }
}

pub(crate) fn hex_encode(key: &str) -> String {
    use std::fmt::Write;

    key.bytes().fold(String::with_capacity(key.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

pub(crate) fn hex_decode(name: &str) -> Option<String> {
    if name.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
