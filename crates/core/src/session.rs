//! Session types.
//!
//! A session is a time-bounded group of one visitor's events with no internal
//! gap exceeding the inactivity threshold. Sessions are derived and owned
//! exclusively by the sessionizer; this module holds the closed aggregate
//! handed to the metrics aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inactivity gap that closes a session (fixed policy, 30 minutes).
pub const INACTIVITY_GAP_MINUTES: i64 = 30;

/// A closed visitor session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub site_id: Uuid,
    pub visitor_id: String,
    /// Session grouping key (client hint or visitor id)
    pub session_key: String,
    pub start: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Pageview paths in timestamp order
    pub page_sequence: Vec<String>,
    /// Exactly one pageview in the session
    pub is_bounce: bool,
    pub duration_seconds: i64,
}

impl Session {
    /// First page viewed in the session.
    pub fn entry_page(&self) -> Option<&str> {
        self.page_sequence.first().map(String::as_str)
    }

    /// Last page viewed in the session.
    pub fn exit_page(&self) -> Option<&str> {
        self.page_sequence.last().map(String::as_str)
    }
}
