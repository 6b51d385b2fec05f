//! Read-side query service over committed aggregates.
//!
//! Queries only ever merge stored buckets; ratios are recomputed from the
//! merged numerators and denominators so a summary over many windows is
//! exactly the summary of one big window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use event_store::EventStore;
use pulse_core::{
    sorted_breakdown, Breakdown, DeviceClass, Granularity, HeatmapCell, Result,
};
use telemetry::metrics;

use crate::aggregator::RollupStore;
use crate::binner::{HeatmapStore, ScrollDistribution};

/// Breakdown rankings are capped at this many entries.
const TOP_N: usize = 10;

/// Ranges at or under this width default to hourly buckets.
const HOURLY_CUTOFF_HOURS: i64 = 48;

/// Minute buckets unioned for the active-visitor count.
const ACTIVE_WINDOW_MINUTES: i64 = 5;

/// Aggregated analytics for one site over one query range.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub site_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,

    pub pageviews: u64,
    pub clicks: u64,
    pub form_submits: u64,
    pub js_errors: u64,
    pub unique_visitors: u64,

    pub sessions: u64,
    pub bounce_rate: f64,
    pub avg_session_duration_secs: f64,
    pub avg_load_time_ms: f64,
    pub avg_time_on_page_secs: f64,

    pub top_pages: Vec<Breakdown>,
    pub top_referrers: Vec<Breakdown>,
    pub devices: Vec<Breakdown>,
    pub error_types: Vec<Breakdown>,
    pub entry_pages: Vec<Breakdown>,
    pub exit_pages: Vec<Breakdown>,
}

/// Preset range selector for the realtime view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeSelector {
    Today,
    Week,
    Month,
}

impl RealtimeSelector {
    /// Range start for the selector, relative to `now`.
    pub fn range_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Today => Granularity::Day.bucket_start(now),
            Self::Week => now - Duration::days(7),
            Self::Month => now - Duration::days(30),
        }
    }
}

/// Live traffic snapshot for one site.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeSnapshot {
    pub site_id: Uuid,
    /// Distinct visitors seen in the last five minutes
    pub active_visitors: u64,
    pub pageviews: u64,
    pub sessions: u64,
    pub top_pages: Vec<Breakdown>,
}

/// Read-only facade over the rollup, heatmap, and event stores.
pub struct QueryService {
    rollups: Arc<RollupStore>,
    heatmaps: Arc<HeatmapStore>,
    store: Arc<EventStore>,
}

impl QueryService {
    pub fn new(
        rollups: Arc<RollupStore>,
        heatmaps: Arc<HeatmapStore>,
        store: Arc<EventStore>,
    ) -> Self {
        Self {
            rollups,
            heatmaps,
            store,
        }
    }

    /// Picks the bucket width for a range when the caller leaves it open.
    pub fn auto_granularity(start: DateTime<Utc>, end: DateTime<Utc>) -> Granularity {
        if end - start <= Duration::hours(HOURLY_CUTOFF_HOURS) {
            Granularity::Hour
        } else {
            Granularity::Day
        }
    }

    /// Full analytics summary for a site over `[start, end]`.
    pub fn summary(
        &self,
        site_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Option<Granularity>,
    ) -> AnalyticsSummary {
        let started = std::time::Instant::now();
        let granularity = granularity.unwrap_or_else(|| Self::auto_granularity(start, end));
        let merged = self.rollups.merged_range(site_id, start, end, granularity);

        let avg_time_on_page_secs = if merged.time_on_page_samples == 0 {
            0.0
        } else {
            merged.time_on_page_sum_secs / merged.time_on_page_samples as f64
        };

        let mut top_pages = sorted_breakdown(&merged.path_views);
        top_pages.truncate(TOP_N);
        let mut top_referrers = sorted_breakdown(&merged.referrers);
        top_referrers.truncate(TOP_N);
        let mut error_types = sorted_breakdown(&merged.error_types);
        error_types.truncate(TOP_N);
        let mut entry_pages = sorted_breakdown(&merged.entry_pages);
        entry_pages.truncate(TOP_N);
        let mut exit_pages = sorted_breakdown(&merged.exit_pages);
        exit_pages.truncate(TOP_N);

        let summary = AnalyticsSummary {
            site_id,
            start,
            end,
            granularity,
            pageviews: merged.pageviews,
            clicks: merged.clicks,
            form_submits: merged.form_submits,
            js_errors: merged.js_errors,
            unique_visitors: merged.unique_visitors(),
            sessions: merged.sessions,
            bounce_rate: merged.bounce_rate(),
            avg_session_duration_secs: merged.avg_session_duration_secs(),
            avg_load_time_ms: merged.avg_load_time_ms(),
            avg_time_on_page_secs,
            top_pages,
            top_referrers,
            devices: sorted_breakdown(&merged.devices),
            error_types,
            entry_pages,
            exit_pages,
        };
        metrics()
            .query_latency_ms
            .observe(started.elapsed().as_millis() as u64);
        summary
    }

    /// Live snapshot: selector-ranged counters plus an active-visitor count
    /// from the union of the trailing minute buckets.
    pub fn realtime(
        &self,
        site_id: Uuid,
        selector: RealtimeSelector,
        now: DateTime<Utc>,
    ) -> RealtimeSnapshot {
        let active_window_start = now - Duration::minutes(ACTIVE_WINDOW_MINUTES);
        let active = self.rollups.merged_range(
            site_id,
            active_window_start,
            now,
            Granularity::Minute,
        );

        let range = self.rollups.merged_range(
            site_id,
            selector.range_start(now),
            now,
            Granularity::Minute,
        );
        let mut top_pages = sorted_breakdown(&range.path_views);
        top_pages.truncate(TOP_N);

        RealtimeSnapshot {
            site_id,
            active_visitors: active.unique_visitors(),
            pageviews: range.pageviews,
            sessions: range.sessions,
            top_pages,
        }
    }

    /// Distinct tracked page paths for a site, sorted.
    pub fn pages(&self, site_id: Uuid) -> Vec<String> {
        self.store.tracked_paths(site_id)
    }

    pub fn heatmap(
        &self,
        site_id: Uuid,
        page_path: &str,
        device_class: Option<DeviceClass>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<HeatmapCell> {
        self.heatmaps
            .click_points(site_id, page_path, device_class, start, end)
    }

    pub fn scrollmap(
        &self,
        site_id: Uuid,
        page_path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ScrollDistribution {
        self.heatmaps
            .scroll_distribution(site_id, page_path, start, end)
    }

    /// Summary rendered as CSV, one metric per row.
    pub fn summary_csv(
        &self,
        site_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String> {
        let summary = self.summary(site_id, start, end, None);
        let mut out = String::from("metric,value\n");
        let rows: &[(&str, String)] = &[
            ("pageviews", summary.pageviews.to_string()),
            ("clicks", summary.clicks.to_string()),
            ("form_submits", summary.form_submits.to_string()),
            ("js_errors", summary.js_errors.to_string()),
            ("unique_visitors", summary.unique_visitors.to_string()),
            ("sessions", summary.sessions.to_string()),
            ("bounce_rate_pct", format!("{:.2}", summary.bounce_rate)),
            (
                "avg_session_duration_secs",
                format!("{:.2}", summary.avg_session_duration_secs),
            ),
            ("avg_load_time_ms", format!("{:.2}", summary.avg_load_time_ms)),
            (
                "avg_time_on_page_secs",
                format!("{:.2}", summary.avg_time_on_page_secs),
            ),
        ];
        for (metric, value) in rows {
            out.push_str(metric);
            out.push(',');
            out.push_str(value);
            out.push('\n');
        }
        for page in &summary.top_pages {
            out.push_str(&format!("top_page:{},{}\n", page.key, page.count));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use chrono::TimeZone;
    use pulse_core::{page_path, Event, EventType, Session};

    fn pageview(site: Uuid, seq: u64, visitor: &str, url: &str, ts: DateTime<Utc>) -> Event {
        Event {
            seq,
            id: Uuid::new_v4(),
            site_id: site,
            visitor_id: visitor.into(),
            session_hint: None,
            event_type: EventType::Pageview,
            url: url.into(),
            path: page_path(url),
            referrer: None,
            user_agent: None,
            client_timestamp: None,
            server_timestamp: ts,
            payload: None,
            degraded: None,
        }
    }

    fn service() -> (QueryService, Aggregator, Arc<RollupStore>) {
        let rollups = Arc::new(RollupStore::new());
        let service = QueryService::new(
            rollups.clone(),
            Arc::new(HeatmapStore::new()),
            Arc::new(EventStore::new()),
        );
        let agg = Aggregator::new(rollups.clone());
        (service, agg, rollups)
    }

    #[test]
    fn granularity_defaults_by_range_width() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            QueryService::auto_granularity(start, start + Duration::hours(48)),
            Granularity::Hour
        );
        assert_eq!(
            QueryService::auto_granularity(start, start + Duration::hours(49)),
            Granularity::Day
        );
    }

    #[test]
    fn summary_merges_across_buckets() {
        let (service, agg, _) = service();
        let site = Uuid::new_v4();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 5, 10, 15, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 5, 11, 45, 0).unwrap();

        agg.apply_event(&pageview(site, 1, "v1", "/a", t1));
        agg.apply_event(&pageview(site, 2, "v1", "/b", t2));
        agg.apply_event(&pageview(site, 3, "v2", "/a", t2));

        let summary = service.summary(
            site,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap(),
            Some(Granularity::Hour),
        );
        assert_eq!(summary.pageviews, 3);
        // v1 appears in both hour buckets but counts once
        assert_eq!(summary.unique_visitors, 2);
        assert_eq!(summary.top_pages[0].key, "/a");
        assert_eq!(summary.top_pages[0].count, 2);
    }

    #[test]
    fn bounce_rate_recomputed_not_averaged() {
        let (service, agg, _) = service();
        let site = Uuid::new_v4();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 5, 10, 15, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 5, 11, 45, 0).unwrap();

        // Hour one: 1 of 2 bounced (50%). Hour two: 0 of 4 (0%).
        for (i, (start, bounce)) in [(t1, true), (t1, false), (t2, false), (t2, false), (t2, false), (t2, false)]
            .into_iter()
            .enumerate()
        {
            agg.apply_session(&Session {
                site_id: site,
                visitor_id: format!("v{i}"),
                session_key: format!("v{i}"),
                start,
                last_activity: start,
                end: start,
                page_sequence: if bounce {
                    vec!["/x".into()]
                } else {
                    vec!["/x".into(), "/y".into()]
                },
                is_bounce: bounce,
                duration_seconds: 30,
            });
        }

        let summary = service.summary(
            site,
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap(),
            Some(Granularity::Hour),
        );
        // 1 bounce over 6 sessions, not the 25% a naive average would give
        assert!((summary.bounce_rate - 16.666).abs() < 0.01);
    }

    #[test]
    fn realtime_counts_trailing_five_minutes() {
        let (service, agg, _) = service();
        let site = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 10, 30).unwrap();

        agg.apply_event(&pageview(site, 1, "v1", "/a", now - Duration::minutes(2)));
        agg.apply_event(&pageview(site, 2, "v2", "/a", now - Duration::minutes(4)));
        agg.apply_event(&pageview(site, 3, "v3", "/a", now - Duration::minutes(20)));

        let snapshot = service.realtime(site, RealtimeSelector::Today, now);
        assert_eq!(snapshot.active_visitors, 2);
        assert_eq!(snapshot.pageviews, 3);
    }

    #[test]
    fn csv_export_carries_headline_metrics() {
        let (service, agg, _) = service();
        let site = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap();
        agg.apply_event(&pageview(site, 1, "v1", "/a", now));

        let csv = service
            .summary_csv(site, now - Duration::days(7), now)
            .unwrap();
        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("pageviews,1\n"));
        assert!(csv.contains("top_page:/a,1\n"));
    }
}
