// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `Codec`.

#![cfg(feature = "zstd")]

use colcache_codec::{Codec, CompressedEnvelope};
use serde_json::{Value, json};

fn elevation_profile(points: usize) -> Value {
    json!({
        "col": "tourmalet",
        "unit": "m",
        "points": (0..points).map(|i| json!({ "d": i * 25, "alt": 850 + (i % 97) * 12 })).collect::<Vec<_>>(),
    })
}

#[test]
fn round_trip_restores_exact_value() {
    let codec = Codec::new();
    let values = [
        elevation_profile(500),
        json!(vec!["col du galibier"; 200]),
        json!({ "nested": { "deeper": { "weather": vec![json!({"t": 12.5, "wind": null}); 100] } } }),
    ];

    for value in values {
        let stored = codec.compress(value.clone());
        assert!(CompressedEnvelope::is_envelope(&stored), "value was not compressed: {value}");
        assert_eq!(codec.decompress(stored), value);
    }
}

#[test]
fn envelope_is_smaller_than_plain_value() {
    let codec = Codec::new();
    let value = elevation_profile(1_000);
    let plain_len = serde_json::to_vec(&value).unwrap().len();
    let stored_len = serde_json::to_vec(&codec.compress(value)).unwrap().len();
    assert!(stored_len < plain_len, "{stored_len} >= {plain_len}");
}

#[test]
fn non_envelopes_pass_through() {
    let codec = Codec::new();
    for value in [json!(null), json!(42), json!("text"), json!([1, 2, 3]), json!({ "compressed": "yes" })] {
        assert_eq!(codec.decompress(value.clone()), value);
    }
}

#[test]
fn threshold_controls_compression() {
    let value = elevation_profile(100);
    let size = serde_json::to_vec(&value).unwrap().len();

    let above = Codec::new().with_min_size(size + 1);
    assert_eq!(above.compress(value.clone()), value);

    let at = Codec::new().with_min_size(size).with_level(19);
    assert!(CompressedEnvelope::is_envelope(&at.compress(value)));
}
