// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured cache events.
//!
//! Every orchestrator operation reports what happened as a [`CacheEvent`]. Events
//! are written as `tracing` records named `cache.event` and, with the `metrics`
//! feature, counted through OpenTelemetry instruments.

use std::time::Duration;

use colcache_tier::Error;
use tracing::Level;

use crate::policy::StorageTier;

pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    Set,
    Delete,
    Clear,
    Preload,
    Maintenance,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Set => "cache.set",
            Self::Delete => "cache.delete",
            Self::Clear => "cache.clear",
            Self::Preload => "cache.preload",
            Self::Maintenance => "cache.maintenance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Expired,
    Inserted,
    Deleted,
    Cleared,
    Loaded,
    Evicted,
    Ok,
    Skipped,
    Degraded,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Expired => "cache.expired",
            Self::Inserted => "cache.inserted",
            Self::Deleted => "cache.deleted",
            Self::Cleared => "cache.cleared",
            Self::Loaded => "cache.loaded",
            Self::Evicted => "cache.evicted",
            Self::Ok => "cache.ok",
            Self::Skipped => "cache.skipped",
            Self::Degraded => "cache.degraded",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::Ok | Self::Skipped => Level::DEBUG,
            Self::Expired | Self::Inserted | Self::Deleted | Self::Cleared | Self::Loaded | Self::Evicted => Level::INFO,
            Self::Degraded => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

/// One observation about a cache operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheEvent<'a> {
    pub operation: CacheOperation,
    pub activity: CacheActivity,
    pub tier: Option<StorageTier>,
    pub key: Option<&'a str>,
    pub duration: Option<Duration>,
    pub error: Option<&'a Error>,
}

impl<'a> CacheEvent<'a> {
    pub fn new(operation: CacheOperation, activity: CacheActivity) -> Self {
        Self {
            operation,
            activity,
            tier: None,
            key: None,
            duration: None,
            error: None,
        }
    }

    pub fn tier(mut self, tier: StorageTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn key(mut self, key: &'a str) -> Self {
        self.key = Some(key);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn error(mut self, error: &'a Error) -> Self {
        self.error = Some(error);
        self
    }
}

/// Sink for cache events, cloned into every handle of a cache.
#[derive(Clone, Debug)]
pub(crate) struct CacheTelemetry {
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    metrics: Option<metrics::CacheMetrics>,
}

impl CacheTelemetry {
    pub fn new(logging_enabled: bool) -> Self {
        Self {
            logging_enabled,
            #[cfg(any(feature = "metrics", test))]
            metrics: None,
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub fn with_metrics(mut self, metrics: metrics::CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn record(&self, cache_name: &'static str, event: &CacheEvent<'_>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(metrics) = &self.metrics {
            metrics.record(cache_name, event);
        }

        if self.logging_enabled {
            Self::emit(cache_name, event);
        }
    }

    #[cfg_attr(
        not(any(feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "sizes are only recorded as metrics")
    )]
    pub fn record_size(&self, cache_name: &'static str, tier: StorageTier, usage: u64) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(metrics) = &self.metrics {
            metrics.record_size(cache_name, tier, usage);
        }
    }

    fn emit(cache_name: &'static str, event: &CacheEvent<'_>) {
        let operation = event.operation.as_str();
        let activity = event.activity.as_str();
        let tier = event.tier.map(StorageTier::as_str);
        let key = event.key;
        let duration_ns = event.duration.map(|d| d.as_nanos());
        let error = event.error.map(tracing::field::display);

        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.operation = operation,
                    cache.activity = activity,
                    cache.tier = tier,
                    cache.key = key,
                    cache.duration_ns = ?duration_ns,
                    cache.error = error,
                    "cache.event"
                )
            };
        }

        match event.activity.level() {
            Level::ERROR => emit_event!(error),
            Level::WARN => emit_event!(warn),
            Level::INFO => emit_event!(info),
            _ => emit_event!(debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::KeyValue;

    use super::metrics::{CacheMetrics, create_meter};
    use super::testing::{LogCapture, MetricTester};
    use super::*;

    #[test]
    fn activity_levels() {
        assert_eq!(CacheActivity::Hit.level(), Level::DEBUG);
        assert_eq!(CacheActivity::Miss.level(), Level::DEBUG);
        assert_eq!(CacheActivity::Expired.level(), Level::INFO);
        assert_eq!(CacheActivity::Evicted.level(), Level::INFO);
        assert_eq!(CacheActivity::Degraded.level(), Level::WARN);
        assert_eq!(CacheActivity::Error.level(), Level::ERROR);
    }

    #[test]
    fn operation_names() {
        assert_eq!(CacheOperation::Get.as_str(), "cache.get");
        assert_eq!(CacheOperation::Preload.as_str(), "cache.preload");
        assert_eq!(CacheOperation::Maintenance.as_str(), "cache.maintenance");
    }

    #[test]
    fn emit_writes_every_field() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let event = CacheEvent::new(CacheOperation::Set, CacheActivity::Error)
            .tier(StorageTier::PersistentSync)
            .key("route:galibier")
            .duration(Duration::from_nanos(12_345));
        let error = Error::quota_exceeded("store is full");
        CacheTelemetry::emit("trip_cache", &event.error(&error));

        capture.assert_contains(attributes::CACHE_NAME);
        capture.assert_contains(attributes::CACHE_OPERATION_NAME);
        capture.assert_contains(attributes::CACHE_ACTIVITY_NAME);
        capture.assert_contains(attributes::CACHE_TIER_NAME);
        capture.assert_contains(attributes::CACHE_KEY_NAME);
        capture.assert_contains(attributes::CACHE_DURATION_NAME);
        capture.assert_contains(attributes::CACHE_ERROR_NAME);
        capture.assert_contains(attributes::CACHE_EVENT_NAME);

        capture.assert_contains("trip_cache");
        capture.assert_contains("persistent-sync");
        capture.assert_contains("route:galibier");
        capture.assert_contains("12345");
        capture.assert_contains("quota");
        capture.assert_contains("ERROR");
    }

    #[test]
    fn emit_uses_activity_level() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        CacheTelemetry::emit("cache", &CacheEvent::new(CacheOperation::Get, CacheActivity::Degraded));
        capture.assert_contains("WARN");

        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        CacheTelemetry::emit("cache", &CacheEvent::new(CacheOperation::Get, CacheActivity::Expired));
        capture.assert_contains("INFO");

        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        CacheTelemetry::emit("cache", &CacheEvent::new(CacheOperation::Get, CacheActivity::Hit));
        capture.assert_contains("DEBUG");
    }

    #[test]
    fn disabled_logging_emits_nothing() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        CacheTelemetry::new(false).record("cache", &CacheEvent::new(CacheOperation::Get, CacheActivity::Error));

        assert!(capture.output().is_empty());
    }

    #[test]
    fn metrics_carry_event_attributes() {
        let tester = MetricTester::new();
        let meter = create_meter(tester.meter_provider());
        let telemetry = CacheTelemetry::new(false).with_metrics(CacheMetrics::new(&meter));

        let event = CacheEvent::new(CacheOperation::Get, CacheActivity::Hit)
            .tier(StorageTier::Memory)
            .duration(Duration::from_millis(2));
        telemetry.record("trip_cache", &event);
        telemetry.record_size("trip_cache", StorageTier::PersistentAsync, 2_048);

        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::CACHE_NAME, "trip_cache"),
            KeyValue::new(attributes::CACHE_OPERATION_NAME, "cache.get"),
            KeyValue::new(attributes::CACHE_ACTIVITY_NAME, "cache.hit"),
            KeyValue::new(attributes::CACHE_TIER_NAME, "memory"),
            KeyValue::new(attributes::CACHE_TIER_NAME, "persistent-async"),
        ]);
    }
}
