// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider};
use opentelemetry::{InstrumentationScope, KeyValue};

use super::{CacheEvent, attributes};
use crate::policy::StorageTier;

const METER_NAME: &str = "colcache";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
const CACHE_EVENT_COUNT_NAME: &str = "cache.event.count";
const CACHE_OPERATION_DURATION_NAME: &str = "cache.operation.duration_ns";
const CACHE_SIZE_NAME: &str = "cache.size";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

/// Instruments shared by every clone of a cache.
#[derive(Clone, Debug)]
pub(crate) struct CacheMetrics {
    event_counter: Counter<u64>,
    operation_duration: Histogram<f64>,
    cache_size: Gauge<u64>,
}

impl CacheMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            event_counter: meter
                .u64_counter(CACHE_EVENT_COUNT_NAME)
                .with_description("Cache events")
                .with_unit("{event}")
                .build(),
            operation_duration: meter
                .f64_histogram(CACHE_OPERATION_DURATION_NAME)
                .with_description("Cache operation duration")
                .with_unit("s")
                .build(),
            cache_size: meter
                .u64_gauge(CACHE_SIZE_NAME)
                .with_description("Entries or bytes held by a cache tier")
                .with_unit("{unit}")
                .build(),
        }
    }

    pub fn record(&self, cache_name: &'static str, event: &CacheEvent<'_>) {
        let mut attrs = Vec::with_capacity(4);
        attrs.push(KeyValue::new(attributes::CACHE_NAME, cache_name));
        attrs.push(KeyValue::new(attributes::CACHE_OPERATION_NAME, event.operation.as_str()));
        attrs.push(KeyValue::new(attributes::CACHE_ACTIVITY_NAME, event.activity.as_str()));
        if let Some(tier) = event.tier {
            attrs.push(KeyValue::new(attributes::CACHE_TIER_NAME, tier.as_str()));
        }

        self.event_counter.add(1, &attrs);
        if let Some(duration) = event.duration {
            self.operation_duration.record(duration.as_secs_f64(), &attrs);
        }
    }

    pub fn record_size(&self, cache_name: &'static str, tier: StorageTier, usage: u64) {
        let attrs = [
            KeyValue::new(attributes::CACHE_NAME, cache_name),
            KeyValue::new(attributes::CACHE_TIER_NAME, tier.as_str()),
        ];
        self.cache_size.record(usage, &attrs);
    }
}
