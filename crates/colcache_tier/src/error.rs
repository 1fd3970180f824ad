// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::fmt;

/// The category of a failed cache operation.
///
/// Callers use the kind to tell a degraded result apart from a plain miss, and tiers
/// use it to pick a recovery path (for example, evict and retry on
/// [`ErrorKind::QuotaExceeded`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A value could not be serialized, or stored data could not be parsed.
    Serialization,
    /// The backing store rejected a write because it is full.
    QuotaExceeded,
    /// The backing store is not available in this runtime or failed to open.
    Unavailable,
    /// A value could not be compressed or decompressed.
    Compression,
    /// Any other failure reported by the backing store.
    Storage,
    /// A tier call did not complete within the configured bound.
    Timeout,
    /// A preload data source failed or none was registered for the key.
    DataSource,
    /// The caller passed an argument the cache cannot honor, such as a zero TTL.
    InvalidInput,
}

impl ErrorKind {
    /// Returns a short, stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Serialization => "serialization",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unavailable => "unavailable",
            Self::Compression => "compression",
            Self::Storage => "storage",
            Self::Timeout => "timeout",
            Self::DataSource => "data_source",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a cache operation.
///
/// Wraps the underlying cause together with an [`ErrorKind`]. Use
/// [`std::error::Error::source()`] to reach the cause.
///
/// # Example
///
/// ```
/// use colcache_tier::{Error, ErrorKind};
///
/// let error = Error::quota_exceeded("store is full");
/// assert_eq!(error.kind(), ErrorKind::QuotaExceeded);
/// ```
#[ohno::error]
#[display("cache {kind} error")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Creates a [`ErrorKind::Serialization`] error.
    pub fn serialization(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Serialization, cause)
    }

    /// Creates a [`ErrorKind::QuotaExceeded`] error.
    pub fn quota_exceeded(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::QuotaExceeded, cause)
    }

    /// Creates a [`ErrorKind::Unavailable`] error.
    pub fn unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Unavailable, cause)
    }

    /// Creates a [`ErrorKind::Compression`] error.
    pub fn compression(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Compression, cause)
    }

    /// Creates a [`ErrorKind::Storage`] error.
    pub fn storage(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Storage, cause)
    }

    /// Creates a [`ErrorKind::Timeout`] error.
    pub fn timeout(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Timeout, cause)
    }

    /// Creates a [`ErrorKind::DataSource`] error.
    pub fn data_source(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::DataSource, cause)
    }

    /// Creates a [`ErrorKind::InvalidInput`] error.
    pub fn invalid_input(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::InvalidInput, cause)
    }

    /// Returns `true` for [`ErrorKind::QuotaExceeded`].
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        self.kind == ErrorKind::QuotaExceeded
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
