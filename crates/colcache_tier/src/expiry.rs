// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Absolute expiry and time-to-live types.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How long an entry stays valid after insertion.
///
/// Serialized as a number of milliseconds, or `null` for [`Ttl::Infinite`].
///
/// # Examples
///
/// ```
/// use colcache_tier::Ttl;
/// use std::time::Duration;
///
/// let ttl = Ttl::from(Duration::from_secs(60));
/// assert_eq!(ttl.duration(), Some(Duration::from_secs(60)));
/// assert_eq!(Ttl::Infinite.duration(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ttl {
    /// The entry never expires.
    #[default]
    Infinite,
    /// The entry expires this long after insertion.
    Finite(Duration),
}

impl Ttl {
    /// Creates a finite TTL from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self::Finite(Duration::from_millis(millis))
    }

    /// Creates a finite TTL from seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self::Finite(Duration::from_secs(secs))
    }

    /// Returns the duration, or `None` for an infinite TTL.
    #[must_use]
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Finite(duration) => Some(duration),
        }
    }

    /// Returns `true` for a finite TTL of zero length.
    ///
    /// Such an entry would be expired at the moment it is inserted.
    #[must_use]
    pub fn is_zero(self) -> bool {
        matches!(self, Self::Finite(duration) if duration.is_zero())
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self::Finite(duration)
    }
}

impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Infinite => serializer.serialize_none(),
            Self::Finite(duration) => serializer.serialize_some(&duration_to_millis(*duration)),
        }
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map_or(Self::Infinite, Self::from_millis))
    }
}

/// The absolute wall-clock point at which an entry stops being valid.
///
/// An entry is expired at every instant `now >= at`. Serialized as milliseconds since
/// the Unix epoch, or `null` for [`Expiry::Never`].
///
/// # Examples
///
/// ```
/// use colcache_tier::{Expiry, Ttl};
/// use std::time::{Duration, SystemTime};
///
/// let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
/// let expiry = Expiry::from_ttl(now, Ttl::from_millis(100));
///
/// assert!(!expiry.is_expired_at(now));
/// assert!(expiry.is_expired_at(now + Duration::from_millis(100)));
/// assert!(!Expiry::Never.is_expired_at(now + Duration::from_secs(86_400)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Expiry {
    /// The entry never expires.
    #[default]
    Never,
    /// The entry expires at this point in time.
    At(SystemTime),
}

impl Expiry {
    /// Computes the absolute expiry of an entry inserted at `now` with the given TTL.
    ///
    /// A TTL too large to represent saturates to [`Expiry::Never`].
    #[must_use]
    pub fn from_ttl(now: SystemTime, ttl: Ttl) -> Self {
        match ttl {
            Ttl::Infinite => Self::Never,
            Ttl::Finite(duration) => now.checked_add(duration).map_or(Self::Never, Self::At),
        }
    }

    /// Returns `true` when the entry must be treated as absent at `now`.
    #[must_use]
    pub fn is_expired_at(self, now: SystemTime) -> bool {
        match self {
            Self::Never => false,
            Self::At(at) => now >= at,
        }
    }

    /// Returns the absolute expiry time, if any.
    #[must_use]
    pub fn at(self) -> Option<SystemTime> {
        match self {
            Self::Never => None,
            Self::At(at) => Some(at),
        }
    }

    /// Returns the expiry as milliseconds since the Unix epoch, if any.
    #[must_use]
    pub fn as_millis(self) -> Option<u64> {
        self.at().map(system_time_to_millis)
    }

    /// Creates an expiry from optional milliseconds since the Unix epoch.
    #[must_use]
    pub fn from_millis(millis: Option<u64>) -> Self {
        millis.map_or(Self::Never, |millis| Self::At(system_time_from_millis(millis)))
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_millis().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_millis(Option::<u64>::deserialize(deserializer)?))
    }
}

/// Converts a system time to milliseconds since the Unix epoch.
///
/// Times before the epoch clamp to zero.
#[must_use]
pub fn system_time_to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, duration_to_millis)
}

/// Converts milliseconds since the Unix epoch to a system time.
#[must_use]
pub fn system_time_from_millis(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
