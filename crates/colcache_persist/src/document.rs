// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Asynchronous document databases.

use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use colcache_tier::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::{hex_decode, hex_encode, io_error};
use crate::record::PersistedEntry;

/// One stored document: `{key, value: {value, expiry, timestamp}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// The cache key.
    pub key: String,
    /// The persisted entry.
    pub value: PersistedEntry<Value>,
}

/// A database that can be opened once to obtain a [`DocumentCollection`].
pub trait DocumentDatabase: Send + Sync {
    /// The collection type this database opens.
    type Collection: DocumentCollection + 'static;

    /// Opens the cache collection.
    fn open(&self) -> impl Future<Output = Result<Self::Collection>> + Send;
}

/// A collection of [`DocumentRecord`]s keyed by cache key.
pub trait DocumentCollection: Send + Sync {
    /// Reads a document.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<DocumentRecord>>> + Send;

    /// Writes a document, replacing any with the same key.
    fn put(&self, record: DocumentRecord) -> impl Future<Output = Result<()>> + Send;

    /// Deletes a document, returning `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Deletes every document.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// Returns up to `limit` documents with keys strictly after `after`, in key order.
    fn scan(&self, after: Option<&str>, limit: usize) -> impl Future<Output = Result<Vec<DocumentRecord>>> + Send;
}

type Documents = Arc<Mutex<BTreeMap<String, DocumentRecord>>>;

/// An in-process [`DocumentDatabase`].
///
/// Clones share the same documents. Opening can be made to fail, and the number of
/// opens is counted, so tests can check how a tier handles an unavailable database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentDatabase {
    documents: Documents,
    fail_open: Arc<AtomicBool>,
    quota_bytes: Arc<Mutex<Option<u64>>>,
    opens: Arc<AtomicUsize>,
}

impl MemoryDocumentDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database whose every open fails.
    #[must_use]
    pub fn unavailable() -> Self {
        let database = Self::new();
        database.fail_open.store(true, Ordering::SeqCst);
        database
    }

    /// Rejects writes that would make the serialized documents exceed `quota_bytes`.
    #[must_use]
    pub fn with_quota(self, quota_bytes: u64) -> Self {
        *self.quota_bytes.lock() = Some(quota_bytes);
        self
    }

    /// How many times the database was opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// Returns `true` if no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl DocumentDatabase for MemoryDocumentDatabase {
    type Collection = MemoryCollection;

    async fn open(&self) -> Result<MemoryCollection> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::unavailable("document database failed to open"));
        }
        Ok(MemoryCollection {
            documents: Arc::clone(&self.documents),
            quota_bytes: Arc::clone(&self.quota_bytes),
        })
    }
}

/// The collection of a [`MemoryDocumentDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryCollection {
    documents: Documents,
    quota_bytes: Arc<Mutex<Option<u64>>>,
}

fn document_bytes(record: &DocumentRecord) -> u64 {
    serde_json::to_string(record).map_or(0, |raw| raw.len() as u64)
}

impl DocumentCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.lock().get(key).cloned())
    }

    async fn put(&self, record: DocumentRecord) -> Result<()> {
        let quota = *self.quota_bytes.lock();
        let mut documents = self.documents.lock();
        if let Some(quota) = quota {
            let others: u64 = documents
                .iter()
                .filter(|(key, _)| **key != record.key)
                .map(|(_, other)| document_bytes(other))
                .sum();
            let used = others.saturating_add(document_bytes(&record));
            if used > quota {
                return Err(Error::quota_exceeded(format!("writing {} would use {used} bytes", record.key)));
            }
        }
        documents.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.documents.lock().remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.documents.lock().clear();
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<DocumentRecord>> {
        let documents = self.documents.lock();
        let lower = after.map_or(Bound::Unbounded, |after| Bound::Excluded(after.to_string()));
        Ok(documents
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// A [`DocumentDatabase`] that stores one JSON file per document in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentDatabase {
    root: PathBuf,
}

impl DirectoryDocumentDatabase {
    /// Creates a database rooted at `root`. Nothing touches the disk until it is opened.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DocumentDatabase for DirectoryDocumentDatabase {
    type Collection = DirectoryCollection;

    async fn open(&self) -> Result<DirectoryCollection> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(Error::unavailable)?;
        Ok(DirectoryCollection { root: self.root.clone() })
    }
}

/// The collection of a [`DirectoryDocumentDatabase`].
#[derive(Debug, Clone)]
pub struct DirectoryCollection {
    root: PathBuf,
}

const DOCUMENT_EXTENSION: &str = "json";

impl DirectoryCollection {
    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{DOCUMENT_EXTENSION}", hex_encode(key)))
    }

    async fn sorted_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let name = entry.file_name();
            let key = name
                .to_str()
                .and_then(|name| name.strip_suffix(DOCUMENT_EXTENSION))
                .and_then(|name| name.strip_suffix('.'))
                .and_then(hex_decode);
            if let Some(key) = key {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

impl DocumentCollection for DirectoryCollection {
    async fn get(&self, key: &str) -> Result<Option<DocumentRecord>> {
        match tokio::fs::read(self.path_of(key)).await {
            Ok(raw) => serde_json::from_slice(&raw).map(Some).map_err(Error::serialization),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn put(&self, record: DocumentRecord) -> Result<()> {
        let raw = serde_json::to_vec(&record).map_err(Error::serialization)?;
        tokio::fs::write(self.path_of(&record.key), raw).await.map_err(io_error)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_of(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn clear(&self) -> Result<()> {
        for key in self.sorted_keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    async fn scan(&self, after: Option<&str>, limit: usize) -> Result<Vec<DocumentRecord>> {
        let keys = self.sorted_keys().await?;
        let start = after.map_or(0, |after| keys.partition_point(|key| key.as_str() <= after));
        let mut page = Vec::new();
        for key in keys.iter().skip(start) {
            if page.len() >= limit {
                break;
            }
            // A document deleted between listing and reading is skipped.
            if let Some(record) = self.get(key).await? {
                page.push(record);
            }
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;

    fn record(key: &str) -> DocumentRecord {
        DocumentRecord {
            key: key.to_string(),
            value: PersistedEntry {
                value: json!(key),
                expiry: colcache_tier::Expiry::Never,
                timestamp: 0,
                priority: None,
                last_accessed: None,
            },
        }
    }

    #[test]
    fn memory_scan_pages_in_key_order() {
        block_on(async {
            let collection = MemoryDocumentDatabase::new().open().await.unwrap();
            for key in ["c", "a", "d", "b"] {
                collection.put(record(key)).await.unwrap();
            }

            let first = collection.scan(None, 3).await.unwrap();
            let keys: Vec<_> = first.iter().map(|r| r.key.as_str()).collect();
            assert_eq!(keys, ["a", "b", "c"]);

            let rest = collection.scan(Some("c"), 3).await.unwrap();
            assert_eq!(rest.len(), 1);
            assert_eq!(rest[0].key, "d");
        });
    }

    #[test]
    fn unavailable_database_counts_opens() {
        block_on(async {
            let database = MemoryDocumentDatabase::unavailable();
            assert!(database.open().await.is_err());
            assert_eq!(database.open_count(), 1);
        });
    }

    #[test]
    fn memory_quota_rejects_large_documents() {
        block_on(async {
            let database = MemoryDocumentDatabase::new().with_quota(10);
            let collection = database.open().await.unwrap();
            let err = collection.put(record("too-big")).await.unwrap_err();
            assert!(err.is_quota_exceeded());
            assert!(database.is_empty());
        });
    }
}
