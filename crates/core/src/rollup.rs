//! Rollup buckets: precomputed per-site aggregates over fixed time windows.
//!
//! A bucket is monotonically updated (never rewound) as closed data lands in
//! its window. Ratios like bounce rate are stored as numerator/denominator
//! and divided at read time so partial-window updates stay correct.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::device::DeviceClass;

/// Rollup window width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Minute, Granularity::Hour, Granularity::Day];

    /// Window width in seconds.
    pub fn step_secs(&self) -> i64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3600,
            Self::Day => 86400,
        }
    }

    pub fn step(&self) -> Duration {
        Duration::seconds(self.step_secs())
    }

    /// Start of the window containing `ts` (UTC-aligned).
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let step = self.step_secs();
        Utc.timestamp_opt(secs - secs.rem_euclid(step), 0).unwrap()
    }
}

/// Bucket starts whose windows intersect `[start, end]`, in order.
pub fn buckets_covering(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
) -> Vec<DateTime<Utc>> {
    if end < start {
        return Vec::new();
    }
    let mut starts = Vec::new();
    let mut cursor = granularity.bucket_start(start);
    while cursor <= end {
        starts.push(cursor);
        cursor += granularity.step();
    }
    starts
}

/// Identity of one rollup bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub site_id: Uuid,
    pub granularity: Granularity,
    pub bucket_start: DateTime<Utc>,
}

impl BucketKey {
    pub fn for_timestamp(site_id: Uuid, granularity: Granularity, ts: DateTime<Utc>) -> Self {
        Self {
            site_id,
            granularity,
            bucket_start: granularity.bucket_start(ts),
        }
    }
}

/// Aggregated counters and breakdowns for one site over one window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupBucket {
    // Event counts
    pub pageviews: u64,
    pub clicks: u64,
    pub form_submits: u64,
    pub js_errors: u64,

    // Load time samples (from pageview payloads)
    pub load_time_ms_sum: f64,
    pub load_time_samples: u64,

    // Time-on-page samples (from duration events)
    pub time_on_page_sum_secs: f64,
    pub time_on_page_samples: u64,

    // Session metrics (from closed sessions)
    pub sessions: u64,
    pub bounces: u64,
    pub session_duration_sum_secs: u64,

    // Unique visitors in this window
    pub visitors: HashSet<String>,

    // Breakdowns
    pub referrers: HashMap<String, u64>,
    pub devices: HashMap<DeviceClass, u64>,
    pub path_views: HashMap<String, u64>,
    pub error_types: HashMap<String, u64>,
    pub entry_pages: HashMap<String, u64>,
    pub exit_pages: HashMap<String, u64>,
}

impl RollupBucket {
    /// Merges another bucket into this one: counters sum, maps merge by key,
    /// visitor sets union.
    pub fn merge_from(&mut self, other: &RollupBucket) {
        self.pageviews += other.pageviews;
        self.clicks += other.clicks;
        self.form_submits += other.form_submits;
        self.js_errors += other.js_errors;
        self.load_time_ms_sum += other.load_time_ms_sum;
        self.load_time_samples += other.load_time_samples;
        self.time_on_page_sum_secs += other.time_on_page_sum_secs;
        self.time_on_page_samples += other.time_on_page_samples;
        self.sessions += other.sessions;
        self.bounces += other.bounces;
        self.session_duration_sum_secs += other.session_duration_sum_secs;
        self.visitors.extend(other.visitors.iter().cloned());
        for (k, v) in &other.referrers {
            *self.referrers.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.devices {
            *self.devices.entry(*k).or_default() += v;
        }
        for (k, v) in &other.path_views {
            *self.path_views.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.error_types {
            *self.error_types.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.entry_pages {
            *self.entry_pages.entry(k.clone()).or_default() += v;
        }
        for (k, v) in &other.exit_pages {
            *self.exit_pages.entry(k.clone()).or_default() += v;
        }
    }

    /// Bounce rate as a percentage, computed from stored counts.
    pub fn bounce_rate(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.bounces as f64 / self.sessions as f64 * 100.0
        }
    }

    pub fn avg_load_time_ms(&self) -> f64 {
        if self.load_time_samples == 0 {
            0.0
        } else {
            self.load_time_ms_sum / self.load_time_samples as f64
        }
    }

    pub fn avg_session_duration_secs(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.session_duration_sum_secs as f64 / self.sessions as f64
        }
    }

    pub fn unique_visitors(&self) -> u64 {
        self.visitors.len() as u64
    }
}

/// One entry of a breakdown, the canonical wire shape for keyed counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub key: String,
    pub count: u64,
}

/// Sorts a breakdown map into the canonical order: count descending, key
/// ascending on ties, so rankings are deterministic.
pub fn sorted_breakdown<K: ToString>(map: &HashMap<K, u64>) -> Vec<Breakdown> {
    let mut entries: Vec<Breakdown> = map
        .iter()
        .map(|(k, &count)| Breakdown {
            key: k.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}
