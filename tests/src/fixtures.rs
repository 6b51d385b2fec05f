//! Request body fixtures.

use serde_json::{json, Value};
use uuid::Uuid;

/// Minimal pageview track request.
pub fn pageview(site_id: Uuid, visitor: &str, url: &str) -> Value {
    json!({
        "site_id": site_id,
        "visitor_id": visitor,
        "event_type": "pageview",
        "url": url,
        "payload": { "title": "A Page", "load_time_ms": 180.0 }
    })
}

/// Click with valid coordinates binning into cell (6, 6) on a 50x50 grid.
pub fn click(site_id: Uuid, visitor: &str, url: &str) -> Value {
    json!({
        "site_id": site_id,
        "visitor_id": visitor,
        "event_type": "click",
        "url": url,
        "payload": { "x": 50.0, "y": 100.0, "viewport_w": 400.0, "viewport_h": 800.0 }
    })
}

/// Click missing its coordinates; admitted but degraded.
pub fn degraded_click(site_id: Uuid, visitor: &str, url: &str) -> Value {
    json!({
        "site_id": site_id,
        "visitor_id": visitor,
        "event_type": "click",
        "url": url,
        "payload": { "x": 50.0 }
    })
}

/// Scroll depth sample.
pub fn scroll(site_id: Uuid, visitor: &str, url: &str, depth_pct: f64) -> Value {
    json!({
        "site_id": site_id,
        "visitor_id": visitor,
        "event_type": "scroll",
        "url": url,
        "payload": { "depth_pct": depth_pct }
    })
}

/// Alert rule creation body.
pub fn alert_rule(site_id: Uuid, condition: &str, threshold: f64) -> Value {
    json!({
        "site_id": site_id,
        "name": "traffic watch",
        "condition": condition,
        "threshold": threshold,
        "time_window_secs": 600,
        "notification_email": "owner@example.com"
    })
}
