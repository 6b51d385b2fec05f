//! Heatmap binner: folds enriched click and scroll events into spatial
//! aggregates, partitioned by UTC day so date-range queries stay cheap.
//!
//! Degraded events carry no usable coordinates and are skipped outright.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use pulse_core::{
    buckets_covering, classify_user_agent, click_cell, depth_decile, DeviceClass, Event,
    EventPayload, Granularity, HeatmapCell, HeatmapKey, SeqDedup, DEPTH_DECILES,
};
use telemetry::metrics;

/// One heatmap surface partitioned by day.
type CellKey = (HeatmapKey, DateTime<Utc>);

/// Scroll depth surface: per site, page, and day.
type ScrollKey = (Uuid, String, DateTime<Utc>);

/// How far down the page sessions scrolled, as a reach count per decile.
#[derive(Debug, Clone, Serialize)]
pub struct ScrollDistribution {
    /// Sessions contributing at least one scroll sample
    pub total_sessions: u64,
    /// `reached[d]` = sessions whose max depth reached at least `d * 10`%
    pub reached: Vec<u64>,
}

/// Click-cell and scroll-depth aggregates with their own consumer dedup.
#[derive(Default)]
pub struct HeatmapStore {
    cells: pulse_core::ShardedMap<CellKey, HashMap<(u32, u32), u64>>,
    scroll: pulse_core::ShardedMap<ScrollKey, HashMap<String, u8>>,
    dedup: Mutex<SeqDedup>,
}

impl HeatmapStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn day_of(ts: DateTime<Utc>) -> DateTime<Utc> {
        Granularity::Day.bucket_start(ts)
    }

    /// Applies one event. Only enriched clicks and scrolls contribute;
    /// everything else (including replays) is a no-op.
    pub fn apply(&self, event: &Event) {
        if !self.dedup.lock().insert(event.seq) {
            metrics().duplicate_events_skipped.inc();
            return;
        }
        if !event.is_enriched() {
            return;
        }

        match event.payload.as_ref() {
            Some(EventPayload::Click(data)) => {
                let Some(cell) = click_cell(data.x, data.y, data.viewport_w, data.viewport_h)
                else {
                    return;
                };
                let key = (
                    HeatmapKey {
                        site_id: event.site_id,
                        page_path: event.path.clone(),
                        device_class: classify_user_agent(event.user_agent.as_deref()),
                    },
                    Self::day_of(event.server_timestamp),
                );
                self.cells.with_entry(key, |counts| {
                    *counts.entry(cell).or_default() += 1;
                });
                metrics().heatmap_clicks_binned.inc();
            }
            Some(EventPayload::Scroll(data)) => {
                let decile = depth_decile(data.depth_pct);
                let key = (
                    event.site_id,
                    event.path.clone(),
                    Self::day_of(event.server_timestamp),
                );
                let session_key = event.session_key().to_string();
                self.scroll.with_entry(key, |depths| {
                    let max = depths.entry(session_key).or_insert(0);
                    if decile > *max {
                        *max = decile;
                    }
                });
                metrics().scroll_samples_recorded.inc();
            }
            _ => {}
        }
    }

    /// Populated click cells for one page over a date range, optionally
    /// filtered to one device class. Cells merge across days and (when
    /// unfiltered) across devices.
    pub fn click_points(
        &self,
        site_id: Uuid,
        page_path: &str,
        device_class: Option<DeviceClass>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<HeatmapCell> {
        let devices: Vec<DeviceClass> = match device_class {
            Some(d) => vec![d],
            None => vec![DeviceClass::Desktop, DeviceClass::Mobile, DeviceClass::Tablet],
        };

        let mut merged: HashMap<(u32, u32), u64> = HashMap::new();
        for day in buckets_covering(start, end, Granularity::Day) {
            for &device in &devices {
                let key = (
                    HeatmapKey {
                        site_id,
                        page_path: page_path.to_string(),
                        device_class: device,
                    },
                    day,
                );
                self.cells.with_value(&key, |counts| {
                    for (&cell, &count) in counts {
                        *merged.entry(cell).or_default() += count;
                    }
                });
            }
        }

        let mut points: Vec<HeatmapCell> = merged
            .into_iter()
            .map(|((cell_x, cell_y), count)| HeatmapCell {
                cell_x,
                cell_y,
                count,
            })
            .collect();
        points.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| (a.cell_y, a.cell_x).cmp(&(b.cell_y, b.cell_x)))
        });
        points
    }

    /// Scroll reach per decile for one page over a date range. A session
    /// counts toward every decile up to its maximum depth.
    pub fn scroll_distribution(
        &self,
        site_id: Uuid,
        page_path: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ScrollDistribution {
        // Sessions can span days; keep the max decile per session key.
        let mut max_depths: HashMap<String, u8> = HashMap::new();
        for day in buckets_covering(start, end, Granularity::Day) {
            let key = (site_id, page_path.to_string(), day);
            self.scroll.with_value(&key, |depths| {
                for (session_key, &decile) in depths {
                    let max = max_depths.entry(session_key.clone()).or_insert(0);
                    if decile > *max {
                        *max = decile;
                    }
                }
            });
        }

        let mut reached = vec![0u64; DEPTH_DECILES as usize];
        for &decile in max_depths.values() {
            for slot in reached.iter_mut().take(decile as usize + 1) {
                *slot += 1;
            }
        }
        ScrollDistribution {
            total_sessions: max_depths.len() as u64,
            reached,
        }
    }
}
