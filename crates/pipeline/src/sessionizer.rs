//! Sessionizer: groups each visitor's events into sessions by the
//! inactivity-gap rule.
//!
//! State is sharded by `(site, visitor)` stream, so two visitors are always
//! processed independently while one visitor's events serialize on their
//! shard. Applying is duplicate-tolerant: every event's sequence id is
//! checked before it can touch a session.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use event_store::StreamKey;
use pulse_core::{Event, EventType, Session, ShardedMap, INACTIVITY_GAP_MINUTES};
use telemetry::metrics;

/// An open, mutable-until-closed session.
#[derive(Debug)]
struct OpenSession {
    session_key: String,
    start: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Pageview (timestamp, path) pairs, kept in timestamp order
    pages: Vec<(DateTime<Utc>, String)>,
}

impl OpenSession {
    fn open(event: &Event) -> Self {
        let ts = event.server_timestamp;
        let mut session = Self {
            session_key: event.session_key().to_string(),
            start: ts,
            last_activity: ts,
            pages: Vec::new(),
        };
        session.absorb(event);
        session
    }

    /// Folds an event into the open session. Tolerates out-of-order arrival:
    /// an earlier timestamp pulls `start` back and its pageview lands at the
    /// sorted position, so any arrival order converges to the same state.
    fn absorb(&mut self, event: &Event) {
        let ts = event.server_timestamp;
        if ts < self.start {
            self.start = ts;
        }
        if ts > self.last_activity {
            self.last_activity = ts;
        }
        if event.event_type == EventType::Pageview {
            let idx = self.pages.partition_point(|(t, _)| *t <= ts);
            self.pages.insert(idx, (ts, event.path.clone()));
        }
    }

    fn close(self, site_id: uuid::Uuid, visitor_id: String) -> Session {
        let page_sequence: Vec<String> = self.pages.into_iter().map(|(_, p)| p).collect();
        Session {
            site_id,
            visitor_id,
            session_key: self.session_key,
            start: self.start,
            last_activity: self.last_activity,
            end: self.last_activity,
            is_bounce: page_sequence.len() == 1,
            duration_seconds: (self.last_activity - self.start).num_seconds(),
            page_sequence,
        }
    }
}

/// Per-visitor sessionization state.
#[derive(Debug, Default)]
struct VisitorState {
    open: Option<OpenSession>,
    /// Seqs applied to the open session
    applied: HashSet<u64>,
    /// Seqs at or below this were applied to already-closed sessions
    applied_floor: u64,
}

impl VisitorState {
    fn is_duplicate(&self, seq: u64) -> bool {
        seq <= self.applied_floor || self.applied.contains(&seq)
    }

    /// Moves the open session's seqs under the floor; called on close so the
    /// per-visitor set stays bounded by one session's size.
    fn seal_applied(&mut self) {
        if let Some(max) = self.applied.iter().max() {
            self.applied_floor = self.applied_floor.max(*max);
        }
        self.applied.clear();
    }
}

/// Groups per-visitor event streams into sessions.
pub struct Sessionizer {
    gap: Duration,
    visitors: ShardedMap<StreamKey, VisitorState>,
    open_count: AtomicU64,
}

impl Default for Sessionizer {
    fn default() -> Self {
        Self::new(Duration::minutes(INACTIVITY_GAP_MINUTES))
    }
}

impl Sessionizer {
    pub fn new(gap: Duration) -> Self {
        Self {
            gap,
            visitors: ShardedMap::default(),
            open_count: AtomicU64::new(0),
        }
    }

    pub fn inactivity_gap(&self) -> Duration {
        self.gap
    }

    /// Applies one event to its visitor's stream, returning any session this
    /// event closed. Replaying an already-applied event is a no-op.
    pub fn apply(&self, event: &Event) -> Vec<Session> {
        let key = StreamKey::of(event);
        let gap = self.gap;
        let mut closed = Vec::new();

        self.visitors.with_entry(key.clone(), |state| {
            if state.is_duplicate(event.seq) {
                metrics().duplicate_events_skipped.inc();
                debug!(seq = event.seq, visitor = %event.visitor_id, "Duplicate event skipped");
                return;
            }

            match state.open.as_mut() {
                None => {
                    state.open = Some(OpenSession::open(event));
                    state.applied.insert(event.seq);
                    self.open_count.fetch_add(1, Ordering::Relaxed);
                    metrics().sessions_opened.inc();
                }
                Some(open) => {
                    if event.server_timestamp > open.last_activity + gap {
                        // Gap exceeded: finalize the old session, start fresh
                        let finished = state
                            .open
                            .take()
                            .map(|o| o.close(key.site_id, key.visitor_id.clone()));
                        state.seal_applied();
                        if let Some(session) = finished {
                            closed.push(session);
                        }
                        state.open = Some(OpenSession::open(event));
                        state.applied.insert(event.seq);
                        self.open_count.fetch_add(1, Ordering::Relaxed);
                        metrics().sessions_opened.inc();
                        metrics().sessions_closed.inc();
                    } else {
                        if event.server_timestamp + gap < open.start {
                            // Out-of-window stragglers still count rather
                            // than orphan; the window stretches back
                            warn!(
                                seq = event.seq,
                                visitor = %event.visitor_id,
                                "Event predates open session window, merging"
                            );
                        }
                        open.absorb(event);
                        state.applied.insert(event.seq);
                    }
                }
            }
        });

        if !closed.is_empty() {
            self.open_count.fetch_sub(closed.len() as u64, Ordering::Relaxed);
        }
        metrics()
            .open_sessions
            .set(self.open_count.load(Ordering::Relaxed));
        closed
    }

    /// Closes sessions idle longer than the gap even with no new event, so
    /// abandoned sessions surface in metrics promptly.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<Session> {
        let gap = self.gap;
        let mut closed = Vec::new();

        self.visitors.for_each_mut(|key, state| {
            let expired = state
                .open
                .as_ref()
                .map(|open| open.last_activity + gap < now)
                .unwrap_or(false);
            if expired {
                if let Some(open) = state.open.take() {
                    closed.push(open.close(key.site_id, key.visitor_id.clone()));
                }
                state.seal_applied();
            }
        });

        if !closed.is_empty() {
            self.open_count.fetch_sub(closed.len() as u64, Ordering::Relaxed);
            metrics().sessions_swept.inc_by(closed.len() as u64);
            metrics().sessions_closed.inc_by(closed.len() as u64);
        }
        metrics()
            .open_sessions
            .set(self.open_count.load(Ordering::Relaxed));
        closed
    }

    /// Number of currently open sessions.
    pub fn open_sessions(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }
}
