// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for data sources, preloading and warm-up.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use colcache::{UnifiedCache, WarmUp};
use colcache_persist::MemoryKeyValueStore;
use serde_json::{Value, json};
use tick::{Clock, ClockControl};

fn elevation(key: String) -> impl Future<Output = Result<Value, std::io::Error>> {
    async move { Ok(json!({ "key": key, "meters": 2642 })) }
}

#[tokio::test]
async fn preload_counts_only_stored_keys() {
    let cache = UnifiedCache::builder(Clock::new_frozen())
        .key_value_store(MemoryKeyValueStore::new())
        .build();
    cache.register_data_source("col", elevation);
    cache.register_data_source("col:broken", |_key: String| async {
        Err::<Value, _>(std::io::Error::other("upstream down"))
    });

    let loaded = cache.preload(["col:galibier", "col:broken:1", "col:izoard"]).await;

    assert_eq!(loaded, 2);
    let galibier: Value = cache.get("col:galibier").await.unwrap();
    assert_eq!(galibier["meters"], 2642);
    assert!(cache.get::<Value>("col:izoard").await.is_some());
    assert!(cache.get::<Value>("col:broken:1").await.is_none());
}

#[tokio::test]
async fn keys_without_a_source_are_skipped() {
    let cache = UnifiedCache::builder(Clock::new_frozen()).build();
    cache.register_data_source("weather", |_key: String| async { Ok::<_, std::io::Error>(json!({ "temp": 12 })) });

    assert_eq!(cache.preload(["weather:paris", "nutrition:gel"]).await, 1);
    assert!(cache.get::<Value>("nutrition:gel").await.is_none());
    assert_eq!(cache.preload(Vec::<String>::new()).await, 0);
}

#[tokio::test]
async fn longest_registered_prefix_serves_the_key() {
    let cache = UnifiedCache::builder(Clock::new_frozen()).build();
    cache.register_data_source("weather", |_key: String| async { Ok::<_, std::io::Error>(json!("generic")) });
    cache.register_data_source("weather:alps", |_key: String| async { Ok::<_, std::io::Error>(json!("alpine")) });

    assert_eq!(cache.preload(["weather:alps:izoard", "weather:paris"]).await, 2);
    assert_eq!(cache.get::<String>("weather:alps:izoard").await.as_deref(), Some("alpine"));
    assert_eq!(cache.get::<String>("weather:paris").await.as_deref(), Some("generic"));
}

#[tokio::test]
async fn preloaded_values_follow_the_key_strategy() {
    let store = MemoryKeyValueStore::new();
    let cache = UnifiedCache::builder(Clock::new_frozen()).key_value_store(store.clone()).build();
    cache.register_data_source("poi", |key: String| async move { Ok::<_, std::io::Error>(json!({ "name": key })) });

    assert_eq!(cache.preload(["poi:refuge", "poi:fountain"]).await, 2);
    assert_eq!(store.len(), 2);
    assert_eq!(cache.stats().memory.size(), 0);
}

#[tokio::test]
async fn source_timeout_skips_the_key() {
    let control = ClockControl::new().auto_advance_timers(true);
    let cache = UnifiedCache::builder(control.to_clock())
        .operation_timeout(Duration::from_secs(5))
        .build();
    cache.register_data_source("forecast", |_key: String| std::future::pending::<Result<Value, std::io::Error>>());
    cache.register_data_source("weather", |_key: String| async { Ok::<_, std::io::Error>(json!(20)) });

    assert_eq!(cache.preload(["forecast:alps", "weather:paris"]).await, 1);
    assert_eq!(cache.get::<u32>("weather:paris").await, Some(20));
}

#[tokio::test]
async fn warm_up_loads_critical_keys_before_returning() {
    let fetched = Arc::new(AtomicUsize::new(0));
    let cache = UnifiedCache::builder(Clock::new_frozen()).build();
    let counter = Arc::clone(&fetched);
    cache.register_data_source("weather", move |_key: String| {
        counter.fetch_add(1, Ordering::Relaxed);
        async { Ok::<_, std::io::Error>(json!({ "temp": 15 })) }
    });

    let plan = WarmUp::new().critical(["weather:paris", "weather:lyon", "terrain:alps"]);
    let handle = cache.warm_up(plan).await;

    assert_eq!(handle.critical_loaded(), 2);
    assert_eq!(fetched.load(Ordering::Relaxed), 2);
    assert!(cache.get::<Value>("weather:lyon").await.is_some());
    assert_eq!(handle.idle_loaded().await, 0);
}

#[tokio::test]
async fn warm_up_loads_idle_keys_after_the_delay() {
    let control = ClockControl::new().auto_advance_timers(true);
    let clock = control.to_clock();
    let cache = UnifiedCache::builder(clock.clone()).build();
    cache.register_data_source("search", |key: String| async move { Ok::<_, std::io::Error>(json!(key)) });

    let start = clock.system_time();
    let plan = WarmUp::new()
        .critical(["search:galibier"])
        .idle(["search:izoard", "search:bonette"])
        .idle_delay(Duration::from_secs(30));
    let handle = cache.warm_up(plan).await;
    assert_eq!(handle.critical_loaded(), 1);

    assert_eq!(handle.idle_loaded().await, 2);
    assert!(clock.system_time().duration_since(start).unwrap() >= Duration::from_secs(30));
    assert_eq!(cache.get::<String>("search:bonette").await.as_deref(), Some("search:bonette"));
}
