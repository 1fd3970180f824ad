// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tests for the `MockTier` test double.

use colcache_tier::testing::{MockTier, TierOp};
use colcache_tier::{CacheEntry, CacheTier, ErrorKind};

#[tokio::test]
async fn records_operations_in_order() {
    let tier = MockTier::<i32>::new();

    tier.insert("k", CacheEntry::new(1)).await.expect("insert failed");
    let _ = tier.get("k").await.expect("get failed");
    let _ = tier.invalidate("k").await.expect("invalidate failed");
    tier.clear().await.expect("clear failed");

    assert_eq!(
        tier.operations(),
        vec![
            TierOp::Insert {
                key: "k".to_string(),
                entry: CacheEntry::new(1),
            },
            TierOp::Get("k".to_string()),
            TierOp::Invalidate("k".to_string()),
            TierOp::Clear,
        ]
    );
}

#[tokio::test]
async fn fail_when_targets_matching_keys_only() {
    let tier = MockTier::<i32>::new();
    tier.fail_with(ErrorKind::Unavailable);
    tier.fail_when(|op| matches!(op, TierOp::Get(key) if key == "forbidden"));

    let err = tier.get("forbidden").await.expect_err("get should fail");
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(tier.get("allowed").await.is_ok());

    tier.clear_failures();
    assert!(tier.get("forbidden").await.is_ok());
}

#[tokio::test]
async fn failed_insert_does_not_store() {
    let tier = MockTier::<i32>::new();
    tier.fail_when(|op| matches!(op, TierOp::Insert { .. }));

    assert!(tier.insert("k", CacheEntry::new(1)).await.is_err());
    assert!(!tier.contains_key("k"));
    assert_eq!(tier.entry_count(), 0);
}

#[tokio::test]
async fn prune_reduces_to_target() {
    let tier = MockTier::<i32>::new();
    for i in 0..5 {
        tier.insert(&format!("k{i}"), CacheEntry::new(i)).await.expect("insert failed");
    }

    let removed = tier.prune(2).await.expect("prune failed");
    assert_eq!(removed, 3);
    assert_eq!(tier.len(), 2);
}

#[test]
fn availability_is_configurable() {
    let tier = MockTier::<i32>::new();
    assert!(tier.is_available());
    tier.set_available(false);
    assert!(!tier.is_available());
}
