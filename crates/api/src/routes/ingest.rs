//! Collection endpoint handler.
//!
//! Admission order: shape validation, site resolution, rate limit, then
//! payload validation. A bad type-specific payload degrades the event rather
//! than rejecting it, so the base pageview/click/error counts survive buggy
//! tracker versions.

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use pulse_core::{
    limits::MAX_FUTURE_SKEW_SECS, page_path, Event, EventPayload, TrackRequest,
};
use telemetry::metrics;

use crate::response::{ApiError, TrackResponse};
use crate::state::AppState;

/// POST /api/track - Primary event collection endpoint.
pub async fn track_handler(
    State(state): State<AppState>,
    Json(request): Json<TrackRequest>,
) -> Result<Json<TrackResponse>, ApiError> {
    let start = Instant::now();

    if let Err(e) = request.validate() {
        metrics().events_rejected.inc();
        let errors: Vec<String> = e
            .field_errors()
            .into_iter()
            .map(|(field, _)| format!("invalid field: {field}"))
            .collect();
        return Err(ApiError::validation(errors));
    }

    let site = state
        .sites
        .require_active(request.site_id)
        .await
        .map_err(|e| {
            metrics().events_rejected.inc();
            ApiError::from(e)
        })?;

    if !state
        .rate_limiter
        .check(site.id, site.effective_rate_limit())
    {
        metrics().events_rate_limited.inc();
        debug!(site_id = %site.id, "event shed by rate limiter");
        return Err(ApiError::rate_limited(
            format!("site {} exceeded its event rate limit", site.id),
            Some(1),
        ));
    }

    // Payload validation never rejects an admissible base event
    let (payload, degraded) = match EventPayload::from_parts(request.event_type, &request.payload)
    {
        Ok(payload) => (Some(payload), None),
        Err(reason) => {
            metrics().events_degraded.inc();
            warn!(
                site_id = %site.id,
                event_type = %request.event_type,
                ?reason,
                "event payload degraded"
            );
            (None, Some(reason))
        }
    };

    // A client clock too far ahead is useless even as an ordering hint
    let client_timestamp = request.client_timestamp.filter(|ts| {
        *ts <= Utc::now() + Duration::seconds(MAX_FUTURE_SKEW_SECS)
    });

    let event = state.store.append(Event {
        seq: 0,
        id: Uuid::new_v4(),
        site_id: site.id,
        visitor_id: request.visitor_id,
        session_hint: request.session_hint,
        event_type: request.event_type,
        path: page_path(&request.url),
        url: request.url,
        referrer: request.referrer.filter(|r| !r.is_empty()),
        user_agent: request.user_agent,
        client_timestamp,
        server_timestamp: Utc::now(),
        payload,
        degraded,
    });

    metrics().events_admitted.inc();
    let latency_ms = start.elapsed().as_millis() as u64;
    metrics().ingest_latency_ms.observe(latency_ms);

    info!(
        site_id = %event.site_id,
        event_type = %event.event_type,
        seq = event.seq,
        degraded = event.degraded.is_some(),
        latency_ms,
        "event admitted"
    );

    Ok(Json(TrackResponse {
        success: true,
        event_id: event.id,
        seq: event.seq,
        server_timestamp: event.server_timestamp,
        degraded: event.degraded,
    }))
}
