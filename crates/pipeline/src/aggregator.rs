//! Metrics aggregator: folds raw events and closed sessions into rollup
//! buckets per `(site, granularity, window)`.
//!
//! Increments are idempotent (sequence-id dedup for events, identity dedup
//! for sessions) and commutative per bucket, so at-least-once redelivery and
//! concurrent visitors converging on the same bucket are both safe.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use pulse_core::{
    buckets_covering, classify_user_agent, BucketKey, Event, EventPayload, EventType, Granularity,
    RollupBucket, SeqDedup, Session, ShardedMap,
};
use telemetry::metrics;

/// Referrer bucket for pageviews arriving with no referrer.
pub const DIRECT_REFERRER: &str = "Direct";

/// Keyed rollup buckets. Writes lock only the shard the bucket hashes to.
#[derive(Default)]
pub struct RollupStore {
    buckets: ShardedMap<BucketKey, RollupBucket>,
}

impl RollupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a mutation to one bucket, creating it on first touch.
    fn update(&self, key: BucketKey, f: impl FnOnce(&mut RollupBucket)) {
        self.buckets.with_entry(key, f);
    }

    /// Snapshot of one bucket, if populated.
    pub fn get(&self, key: &BucketKey) -> Option<RollupBucket> {
        self.buckets.get_cloned(key)
    }

    /// Merges every bucket of `granularity` whose window intersects
    /// `[start, end]` into one composed bucket.
    pub fn merged_range(
        &self,
        site_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
    ) -> RollupBucket {
        let mut merged = RollupBucket::default();
        for bucket_start in buckets_covering(start, end, granularity) {
            let key = BucketKey {
                site_id,
                granularity,
                bucket_start,
            };
            if let Some(bucket) = self.buckets.get_cloned(&key) {
                merged.merge_from(&bucket);
            }
        }
        merged
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Session identity for idempotent session application.
type SessionIdentity = (Uuid, String, DateTime<Utc>);

/// Folds events and sessions into the rollup store.
pub struct Aggregator {
    rollups: Arc<RollupStore>,
    event_dedup: Mutex<SeqDedup>,
    applied_sessions: Mutex<HashSet<SessionIdentity>>,
}

impl Aggregator {
    pub fn new(rollups: Arc<RollupStore>) -> Self {
        Self {
            rollups,
            event_dedup: Mutex::new(SeqDedup::new()),
            applied_sessions: Mutex::new(HashSet::new()),
        }
    }

    pub fn rollups(&self) -> &Arc<RollupStore> {
        &self.rollups
    }

    /// Applies one raw event to every granularity bucket covering its server
    /// timestamp. Replays are no-ops.
    pub fn apply_event(&self, event: &Event) {
        if !self.event_dedup.lock().insert(event.seq) {
            metrics().duplicate_events_skipped.inc();
            return;
        }

        let device = classify_user_agent(event.user_agent.as_deref());
        for granularity in Granularity::ALL {
            let key = BucketKey::for_timestamp(event.site_id, granularity, event.server_timestamp);
            self.rollups.update(key, |bucket| {
                bucket.visitors.insert(event.visitor_id.clone());
                *bucket.devices.entry(device).or_default() += 1;

                match event.event_type {
                    EventType::Pageview => {
                        bucket.pageviews += 1;
                        *bucket.path_views.entry(event.path.clone()).or_default() += 1;
                        let referrer = event
                            .referrer
                            .as_deref()
                            .filter(|r| !r.is_empty())
                            .unwrap_or(DIRECT_REFERRER);
                        *bucket.referrers.entry(referrer.to_string()).or_default() += 1;
                        if let Some(EventPayload::Pageview(data)) = event.payload.as_ref() {
                            if event.degraded.is_none() {
                                if let Some(load_time) = data.load_time_ms {
                                    bucket.load_time_ms_sum += load_time;
                                    bucket.load_time_samples += 1;
                                }
                            }
                        }
                    }
                    EventType::Click => bucket.clicks += 1,
                    EventType::Scroll => {
                        // Scroll depth is the heatmap binner's concern
                    }
                    EventType::Duration => {
                        if let Some(EventPayload::Duration(data)) = event.payload.as_ref() {
                            if event.degraded.is_none() {
                                bucket.time_on_page_sum_secs += data.seconds;
                                bucket.time_on_page_samples += 1;
                            }
                        }
                    }
                    EventType::JsError => {
                        bucket.js_errors += 1;
                        let message = match event.payload.as_ref() {
                            Some(EventPayload::JsError(data)) if event.degraded.is_none() => {
                                data.message.clone()
                            }
                            _ => "unknown".to_string(),
                        };
                        *bucket.error_types.entry(message).or_default() += 1;
                    }
                    EventType::FormSubmit => bucket.form_submits += 1,
                }
            });
        }
        metrics().rollup_events_applied.inc();
    }

    /// Applies one closed session, keyed into the buckets covering the
    /// session start. Re-applying the same session is a no-op.
    pub fn apply_session(&self, session: &Session) {
        let identity = (
            session.site_id,
            session.visitor_id.clone(),
            session.start,
        );
        if !self.applied_sessions.lock().insert(identity) {
            return;
        }

        for granularity in Granularity::ALL {
            let key = BucketKey::for_timestamp(session.site_id, granularity, session.start);
            self.rollups.update(key, |bucket| {
                bucket.sessions += 1;
                if session.is_bounce {
                    bucket.bounces += 1;
                }
                bucket.session_duration_sum_secs += session.duration_seconds.max(0) as u64;
                if let Some(entry) = session.entry_page() {
                    *bucket.entry_pages.entry(entry.to_string()).or_default() += 1;
                }
                if let Some(exit) = session.exit_page() {
                    *bucket.exit_pages.entry(exit.to_string()).or_default() += 1;
                }
            });
        }
        metrics().rollup_sessions_applied.inc();
    }
}
