// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `CacheEntry`.

use std::time::{Duration, SystemTime};

use colcache_tier::{CacheEntry, Expiry, Priority, Ttl};

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn new_creates_entry_without_timestamp() {
    let entry = CacheEntry::new("test_value");
    assert_eq!(*entry.value(), "test_value");
    assert!(entry.created_at().is_none());
    assert_eq!(entry.expiry(), Expiry::Never);
    assert_eq!(entry.priority(), Priority::Low);
}

#[test]
fn stamped_sets_timestamp_and_expiry() {
    let entry = CacheEntry::new("value").stamped(at(100), Ttl::from_secs(5));
    assert_eq!(entry.created_at(), Some(at(100)));
    assert_eq!(entry.expiry(), Expiry::At(at(105)));
    assert!(!entry.is_expired_at(at(104)));
    assert!(entry.is_expired_at(at(105)));
}

#[test]
fn stamped_with_infinite_ttl_never_expires() {
    let entry = CacheEntry::new(1).stamped(at(100), Ttl::Infinite);
    assert_eq!(entry.expiry(), Expiry::Never);
    assert!(!entry.is_expired_at(at(u64::from(u32::MAX))));
}

#[test]
fn builder_methods_replace_metadata() {
    let entry = CacheEntry::new(7)
        .with_expiry(Expiry::At(at(9)))
        .with_created_at(at(3))
        .with_priority(Priority::High);
    assert_eq!(entry.expiry(), Expiry::At(at(9)));
    assert_eq!(entry.created_at(), Some(at(3)));
    assert_eq!(entry.priority(), Priority::High);
}

#[test]
fn map_keeps_metadata() {
    let entry = CacheEntry::new(21)
        .stamped(at(1), Ttl::from_secs(1))
        .with_priority(Priority::Medium);
    let doubled = entry.clone().map(|v| v * 2);
    assert_eq!(*doubled.value(), 42);
    assert_eq!(doubled.expiry(), entry.expiry());
    assert_eq!(doubled.created_at(), entry.created_at());
    assert_eq!(doubled.priority(), Priority::Medium);
}

#[test]
fn try_map_propagates_error() {
    let entry = CacheEntry::new("not a number");
    let result = entry.try_map(str::parse::<u32>);
    assert!(result.is_err());
}

#[test]
fn deref_and_from() {
    let entry: CacheEntry<String> = "hello".to_string().into();
    assert_eq!(entry.len(), 5);
    assert_eq!(entry.into_value(), "hello");
}

#[test]
fn record_access_counts_reads_and_moves_last_used() {
    let mut entry = CacheEntry::new(1).stamped(at(10), Ttl::Infinite);
    assert_eq!(entry.access_count(), 0);
    assert_eq!(entry.last_used(), Some(at(10)));

    entry.record_access(at(20));
    entry.record_access(at(30));

    assert_eq!(entry.access_count(), 2);
    assert_eq!(entry.last_accessed(), Some(at(30)));
    assert_eq!(entry.last_used(), Some(at(30)));
}

#[test]
fn restamping_resets_access_tracking() {
    let mut entry = CacheEntry::new(1).stamped(at(10), Ttl::Infinite);
    entry.record_access(at(11));
    let entry = entry.stamped(at(12), Ttl::Infinite);
    assert_eq!(entry.access_count(), 0);
    assert!(entry.last_accessed().is_none());
}
