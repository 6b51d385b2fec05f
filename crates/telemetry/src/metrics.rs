//! Internal metrics collection.
//!
//! Counters are collected in memory and periodically logged by the pipeline
//! scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }
}

/// Collected metrics for the analytics engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingest gateway
    pub events_admitted: Counter,
    pub events_rejected: Counter,
    pub events_rate_limited: Counter,
    pub events_degraded: Counter,

    // Sessionizer
    pub sessions_opened: Counter,
    pub sessions_closed: Counter,
    pub sessions_swept: Counter,
    pub duplicate_events_skipped: Counter,

    // Aggregation
    pub rollup_events_applied: Counter,
    pub rollup_sessions_applied: Counter,
    pub heatmap_clicks_binned: Counter,
    pub scroll_samples_recorded: Counter,
    pub consumer_errors: Counter,

    // Alerting
    pub alert_evaluations: Counter,
    pub alerts_fired: Counter,
    pub alert_dispatch_failures: Counter,

    // Latency histograms
    pub ingest_latency_ms: Histogram,
    pub query_latency_ms: Histogram,

    // Gauges
    pub open_sessions: Gauge,
    pub aggregator_lag: Gauge,
    pub binner_lag: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_admitted: u64,
    pub events_rejected: u64,
    pub events_rate_limited: u64,
    pub events_degraded: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub duplicate_events_skipped: u64,
    pub rollup_events_applied: u64,
    pub rollup_sessions_applied: u64,
    pub heatmap_clicks_binned: u64,
    pub scroll_samples_recorded: u64,
    pub consumer_errors: u64,
    pub alert_evaluations: u64,
    pub alerts_fired: u64,
    pub alert_dispatch_failures: u64,
    pub ingest_latency_mean_ms: f64,
    pub query_latency_mean_ms: f64,
    pub open_sessions: u64,
    pub aggregator_lag: u64,
    pub binner_lag: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_admitted: self.events_admitted.get(),
            events_rejected: self.events_rejected.get(),
            events_rate_limited: self.events_rate_limited.get(),
            events_degraded: self.events_degraded.get(),
            sessions_opened: self.sessions_opened.get(),
            sessions_closed: self.sessions_closed.get(),
            duplicate_events_skipped: self.duplicate_events_skipped.get(),
            rollup_events_applied: self.rollup_events_applied.get(),
            rollup_sessions_applied: self.rollup_sessions_applied.get(),
            heatmap_clicks_binned: self.heatmap_clicks_binned.get(),
            scroll_samples_recorded: self.scroll_samples_recorded.get(),
            consumer_errors: self.consumer_errors.get(),
            alert_evaluations: self.alert_evaluations.get(),
            alerts_fired: self.alerts_fired.get(),
            alert_dispatch_failures: self.alert_dispatch_failures.get(),
            ingest_latency_mean_ms: self.ingest_latency_ms.mean(),
            query_latency_mean_ms: self.query_latency_ms.mean(),
            open_sessions: self.open_sessions.get(),
            aggregator_lag: self.aggregator_lag.get(),
            binner_lag: self.binner_lag.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_mean_and_buckets() {
        let h = Histogram::new();
        h.observe(3);
        h.observe(7);
        assert_eq!(h.count(), 2);
        assert_eq!(h.sum(), 10);
        assert_eq!(h.mean(), 5.0);
    }
}
