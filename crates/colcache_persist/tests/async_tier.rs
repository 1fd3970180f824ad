// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `AsyncPersistentTier`.

use std::time::Duration;

use colcache_persist::{AsyncPersistentTier, DirectoryDocumentDatabase, MemoryDocumentDatabase};
use colcache_tier::{CacheEntry, CacheTier, CapacityUnit, ErrorKind, Ttl};
use futures::executor::block_on;
use tick::{Clock, ClockControl};

#[test]
fn concurrent_first_calls_open_once() {
    block_on(async {
        let database = MemoryDocumentDatabase::new();
        let tier = AsyncPersistentTier::<_, u32>::builder(database.clone()).build(Clock::new_frozen());

        let (a, b, c) = futures::join!(
            tier.get("weather:paris"),
            tier.insert("weather:lyon", CacheEntry::new(1)),
            tier.get("weather:lyon"),
        );
        assert!(a.unwrap().is_none());
        b.unwrap();
        let _ = c.unwrap();

        assert!(tier.get("weather:lyon").await.unwrap().is_some());
        assert_eq!(database.open_count(), 1);
    });
}

#[test]
fn failed_open_degrades_to_misses() {
    block_on(async {
        let database = MemoryDocumentDatabase::unavailable();
        let tier = AsyncPersistentTier::<_, String>::builder(database.clone()).build(Clock::new_frozen());
        assert!(tier.is_available());

        let err = tier.insert("terrain:alps", CacheEntry::new("tiles".into())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert_eq!(tier.prune(0).await.unwrap_err().kind(), ErrorKind::Unavailable);
        assert!(tier.get("terrain:alps").await.unwrap().is_none());
        assert_eq!(tier.clean_expired(std::time::SystemTime::UNIX_EPOCH).await.unwrap(), 0);
        assert!(!tier.invalidate("terrain:alps").await.unwrap());
        assert_eq!(tier.clear_namespace("terrain").await.unwrap(), 0);
        tier.clear().await.unwrap();

        assert!(!tier.is_available());
        assert_eq!(tier.stats().unit(), CapacityUnit::Bytes);
        assert_eq!(tier.stats().capacity(), 0);
        assert_eq!(database.open_count(), 1);
    });
}

#[test]
fn namespace_clear_walks_every_page() {
    block_on(async {
        let database = MemoryDocumentDatabase::new();
        let tier = AsyncPersistentTier::<_, u32>::builder(database.clone())
            .page_size(2)
            .build(Clock::new_frozen());

        for key in [
            "terrain:ecrins",
            "weather:a",
            "weather:b",
            "weather:c",
            "weather:d",
            "weather:e",
            "weatherstation_1",
            "zone_42",
        ] {
            tier.insert(key, CacheEntry::new(0)).await.unwrap();
        }

        assert_eq!(
            tier.keys_starting_with("weather:").await.unwrap(),
            ["weather:a", "weather:b", "weather:c", "weather:d", "weather:e"]
        );
        assert_eq!(tier.clear_namespace("weather:").await.unwrap(), 5);
        assert_eq!(database.len(), 3);
        assert_eq!(tier.len(), 3);

        assert_eq!(tier.clear_namespace("weather").await.unwrap(), 1);
        assert!(tier.get("zone_42").await.unwrap().is_some());
    });
}

#[test]
fn expired_documents_are_absent_and_swept() {
    block_on(async {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let database = MemoryDocumentDatabase::new();
        let tier = AsyncPersistentTier::<_, String>::builder(database.clone())
            .page_size(1)
            .build(clock.clone());

        let now = clock.system_time();
        for key in ["nutrition:a", "nutrition:b", "nutrition:c"] {
            tier.insert(key, CacheEntry::<String>::new(key.into()).stamped(now, Ttl::from_secs(60)))
                .await
                .unwrap();
        }
        tier.insert("route:keep", CacheEntry::<String>::new("gpx".into()).stamped(now, Ttl::Infinite))
            .await
            .unwrap();

        control.advance(Duration::from_secs(60));

        assert!(tier.get("nutrition:a").await.unwrap().is_none());
        assert_eq!(tier.clean_expired(clock.system_time()).await.unwrap(), 2);
        assert_eq!(database.len(), 1);
        assert_eq!(tier.stats().counters().expirations, 3);
    });
}

#[test]
fn usage_stays_within_budget() {
    block_on(async {
        let tier = AsyncPersistentTier::<_, String>::builder(MemoryDocumentDatabase::new())
            .max_bytes(3_000)
            .build(Clock::new_frozen());

        for i in 0..20 {
            tier.insert(&format!("route:{i:02}"), CacheEntry::new("x".repeat(100))).await.unwrap();
            assert!(tier.stats().usage() <= 3_000);
        }
        assert!(tier.stats().counters().evictions > 0);
        assert!(tier.get("route:19").await.unwrap().is_some());
        assert!(tier.get("route:00").await.unwrap().is_none());
    });
}

#[tokio::test]
async fn directory_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("documents");

    let tier = AsyncPersistentTier::<_, String>::builder(DirectoryDocumentDatabase::new(&path)).build(Clock::new_frozen());
    tier.insert("col:izoard", CacheEntry::new("2360 m".into())).await.unwrap();
    tier.insert("col:galibier", CacheEntry::new("2642 m".into())).await.unwrap();
    tier.insert("poi:refuge", CacheEntry::new("open".into())).await.unwrap();
    drop(tier);

    let reopened = AsyncPersistentTier::<_, String>::builder(DirectoryDocumentDatabase::new(&path))
        .page_size(2)
        .build(Clock::new_frozen());
    let entry = reopened.get("col:izoard").await.unwrap().unwrap();
    assert_eq!(entry.value(), "2360 m");
    assert_eq!(reopened.len(), 3);

    assert_eq!(reopened.clear_namespace("col").await.unwrap(), 2);
    reopened.clear().await.unwrap();
    assert!(reopened.is_empty());
}
