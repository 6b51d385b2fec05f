//! Event type definitions for the analytics engine.
//!
//! An [`Event`] is an immutable fact: created once at ingest, never mutated.
//! Type-specific payloads that fail validation degrade the event (stored
//! without enrichment data) instead of rejecting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Behavioral event types tracked per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pageview,
    Click,
    Scroll,
    Duration,
    JsError,
    FormSubmit,
}

impl EventType {
    /// Returns the event type as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pageview => "pageview",
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Duration => "duration",
            Self::JsError => "js_error",
            Self::FormSubmit => "form_submit",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pageview event data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PageviewData {
    #[validate(length(max = 500))]
    pub title: Option<String>,
    /// Page load time (ms)
    #[validate(range(min = 0.0, max = 300000.0))]
    pub load_time_ms: Option<f64>,
}

/// Click event data. Coordinates are raw pixels; the heatmap binner
/// normalizes them against the viewport.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClickData {
    pub x: f64,
    pub y: f64,
    #[validate(range(min = 1.0))]
    pub viewport_w: f64,
    #[validate(range(min = 1.0))]
    pub viewport_h: f64,
}

/// Scroll event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScrollData {
    /// Maximum scroll depth reached, as a percentage (0-100)
    #[validate(range(min = 0.0, max = 100.0))]
    pub depth_pct: f64,
}

/// Time-on-page event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DurationData {
    #[validate(range(min = 0.0, max = 86400.0))]
    pub seconds: f64,
}

/// Script error event data.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JsErrorData {
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
    #[validate(length(max = 2048))]
    pub filename: Option<String>,
    pub line: Option<u32>,
}

/// Form submission event data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FormSubmitData {
    #[validate(length(max = 256))]
    pub form_id: Option<String>,
}

/// Event payload variants, tagged by event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Pageview(PageviewData),
    Click(ClickData),
    Scroll(ScrollData),
    Duration(DurationData),
    JsError(JsErrorData),
    FormSubmit(FormSubmitData),
}

impl EventPayload {
    /// Returns the event type this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Pageview(_) => EventType::Pageview,
            Self::Click(_) => EventType::Click,
            Self::Scroll(_) => EventType::Scroll,
            Self::Duration(_) => EventType::Duration,
            Self::JsError(_) => EventType::JsError,
            Self::FormSubmit(_) => EventType::FormSubmit,
        }
    }

    /// Parses and validates the type-specific payload for an event type.
    ///
    /// `Err` means the base event is still admissible but must be stored
    /// degraded, with the reason recorded so downstream consumers skip the
    /// type-specific enrichment.
    pub fn from_parts(
        event_type: EventType,
        raw: &serde_json::Value,
    ) -> std::result::Result<EventPayload, DegradedReason> {
        fn parse<T>(raw: &serde_json::Value) -> std::result::Result<T, DegradedReason>
        where
            T: serde::de::DeserializeOwned + Validate,
        {
            let data: T = serde_json::from_value(raw.clone())
                .map_err(|_| DegradedReason::MissingPayload)?;
            data.validate().map_err(|_| DegradedReason::InvalidPayload)?;
            Ok(data)
        }

        match event_type {
            EventType::Pageview => parse(raw).map(EventPayload::Pageview),
            EventType::Click => parse(raw).map(EventPayload::Click),
            EventType::Scroll => parse(raw).map(EventPayload::Scroll),
            EventType::Duration => parse(raw).map(EventPayload::Duration),
            EventType::JsError => parse(raw).map(EventPayload::JsError),
            EventType::FormSubmit => parse(raw).map(EventPayload::FormSubmit),
        }
    }
}

/// Why an event was stored without its type-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Required payload fields absent or the wrong shape
    MissingPayload,
    /// Payload present but failed range/length validation
    InvalidPayload,
}

/// A single admitted analytics event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Durable sequence id, assigned by the event store at append.
    /// Sequence ids are globally contiguous and strictly increasing.
    pub seq: u64,
    /// Unique event ID
    pub id: Uuid,
    /// Tenant site ID
    pub site_id: Uuid,
    /// Pseudonymous visitor ID, stable per browser per site
    pub visitor_id: String,
    /// Client-proposed session correlation token (hint only)
    pub session_hint: Option<String>,
    /// Event type
    pub event_type: EventType,
    /// Full URL as reported by the client
    pub url: String,
    /// Path component of the URL, used as the page key everywhere downstream
    pub path: String,
    /// Referrer URL
    pub referrer: Option<String>,
    /// Declared user agent
    pub user_agent: Option<String>,
    /// Client clock timestamp; ordering hint only, may be skewed
    pub client_timestamp: Option<DateTime<Utc>>,
    /// Server-authoritative timestamp, assigned at admission
    pub server_timestamp: DateTime<Utc>,
    /// Validated type-specific payload; `None` when degraded
    pub payload: Option<EventPayload>,
    /// Set when the type-specific payload failed validation
    pub degraded: Option<DegradedReason>,
}

impl Event {
    /// Whether downstream consumers may use the type-specific payload.
    pub fn is_enriched(&self) -> bool {
        self.degraded.is_none() && self.payload.is_some()
    }

    /// The session grouping key: the client hint when present, otherwise
    /// the visitor id.
    pub fn session_key(&self) -> &str {
        self.session_hint.as_deref().unwrap_or(&self.visitor_id)
    }
}

/// One tracked event as submitted by a client, before admission.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TrackRequest {
    pub site_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub visitor_id: String,
    #[validate(length(max = 128))]
    pub session_hint: Option<String>,
    pub event_type: EventType,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
    #[validate(length(max = 2048))]
    pub referrer: Option<String>,
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    pub client_timestamp: Option<DateTime<Utc>>,
    /// Type-specific payload, validated separately so a bad payload degrades
    /// rather than rejects.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Extracts the path component of a reported URL.
///
/// Query strings and fragments are stripped so the same page aggregates under
/// one key regardless of tracking parameters.
pub fn page_path(url: &str) -> String {
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(idx) if url.contains("://") => &after_scheme[idx..],
        _ if url.starts_with('/') => url,
        _ => "/",
    };
    let end = path
        .find(['?', '#'])
        .unwrap_or(path.len());
    let trimmed = &path[..end];
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
