//! The append-only event log.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use pulse_core::{Event, EventType, ShardedMap};

use crate::cursor::Cursor;

/// Partition key for ordered per-visitor replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub site_id: Uuid,
    pub visitor_id: String,
}

impl StreamKey {
    pub fn of(event: &Event) -> Self {
        Self {
            site_id: event.site_id,
            visitor_id: event.visitor_id.clone(),
        }
    }
}

/// Append-only, time-ordered record of raw events.
///
/// Events land in two indexes: the global log in sequence order (what
/// consumers fetch from) and per `(site, visitor)` streams (ordered replay).
/// Stream appends take only that stream's shard lock, so concurrent sites
/// and visitors never contend there; the global log append is a single O(1)
/// push under a short write lock that also serializes seq assignment.
pub struct EventStore {
    log: RwLock<Vec<Arc<Event>>>,
    streams: ShardedMap<StreamKey, Vec<Arc<Event>>>,
    site_paths: ShardedMap<Uuid, BTreeSet<String>>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            streams: ShardedMap::default(),
            site_paths: ShardedMap::default(),
        }
    }

    /// Appends an event, assigning its durable sequence id and the
    /// server-authoritative timestamp.
    ///
    /// Both are assigned under the same lock, so sequence order and
    /// server-timestamp order agree exactly.
    pub fn append(&self, mut event: Event) -> Arc<Event> {
        let event = {
            let mut log = self.log.write();
            event.seq = log.len() as u64 + 1;
            event.server_timestamp = Utc::now();
            let arc = Arc::new(event);
            log.push(arc.clone());
            arc
        };

        self.streams
            .with_entry(StreamKey::of(&event), |stream| stream.push(event.clone()));

        if matches!(event.event_type, EventType::Pageview | EventType::Click) {
            self.site_paths.with_entry(event.site_id, |paths| {
                if !paths.contains(&event.path) {
                    paths.insert(event.path.clone());
                }
            });
        }

        debug!(seq = event.seq, site_id = %event.site_id, event_type = %event.event_type, "Event appended");
        event
    }

    /// Fetches up to `max` events at the cursor, in sequence order, with the
    /// cursor to commit once they are applied. Returns an empty batch at the
    /// head of the log.
    pub fn fetch_since(&self, cursor: Cursor, max: usize) -> (Vec<Arc<Event>>, Cursor) {
        let log = self.log.read();
        let start = (cursor.next_seq.max(1) - 1) as usize;
        if start >= log.len() {
            return (Vec::new(), cursor);
        }
        let end = (start + max).min(log.len());
        let batch: Vec<Arc<Event>> = log[start..end].iter().cloned().collect();
        let next = Cursor::at(end as u64 + 1);
        (batch, next)
    }

    /// Replays one visitor's events in order.
    pub fn replay_stream(&self, site_id: Uuid, visitor_id: &str) -> Vec<Arc<Event>> {
        let key = StreamKey {
            site_id,
            visitor_id: visitor_id.to_string(),
        };
        self.streams
            .with_value(&key, |stream| stream.clone())
            .unwrap_or_default()
    }

    /// Distinct tracked page paths for a site, in lexical order.
    pub fn tracked_paths(&self, site_id: Uuid) -> Vec<String> {
        self.site_paths
            .with_value(&site_id, |paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Highest assigned sequence id.
    pub fn latest_seq(&self) -> u64 {
        self.log.read().len() as u64
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }
}
