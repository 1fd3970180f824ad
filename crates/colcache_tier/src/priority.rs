// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Eviction priority of a cache entry.
///
/// Priority never affects expiry. Persistent tiers evict lower ranks first and,
/// within one rank, the least recently used entry first.
///
/// # Examples
///
/// ```
/// use colcache_tier::Priority;
///
/// assert!(Priority::Low < Priority::High);
/// assert_eq!(Priority::Medium.rank(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Evicted first.
    #[default]
    Low,
    /// Evicted after every low priority entry.
    Medium,
    /// Evicted last.
    High,
}

impl Priority {
    /// Numeric eviction rank: 0 for low, 1 for medium, 2 for high.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Returns the lowercase name used in persisted entries and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_rank_for_every_pair() {
        let all = [Priority::Low, Priority::Medium, Priority::High];
        for a in all {
            for b in all {
                assert_eq!(a.cmp(&b), a.rank().cmp(&b.rank()), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
        let parsed: Priority = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Priority::Medium);
    }
}
