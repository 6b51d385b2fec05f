//! Analytics query endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pipeline::{AnalyticsSummary, RealtimeSelector, RealtimeSnapshot, ScrollDistribution};
use pulse_core::Granularity;

use crate::response::ApiError;
use crate::state::AppState;

/// Query range, defaulting to the trailing seven days.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub granularity: Option<Granularity>,
}

impl RangeQuery {
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self.start.unwrap_or(end - Duration::days(7));
        (start, end)
    }
}

/// GET /api/analytics/:site_id - Aggregated summary over a date range.
pub async fn summary_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    state.sites.require_known(site_id).await?;
    let (start, end) = range.bounds();
    if end < start {
        return Err(ApiError::bad_request("range end precedes start"));
    }
    Ok(Json(
        state
            .pipeline
            .query()
            .summary(site_id, start, end, range.granularity),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    pub range: Option<RealtimeSelector>,
}

/// GET /api/analytics/:site_id/realtime - Live traffic snapshot.
pub async fn realtime_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Query(query): Query<RealtimeQuery>,
) -> Result<Json<RealtimeSnapshot>, ApiError> {
    state.sites.require_known(site_id).await?;
    let selector = query.range.unwrap_or(RealtimeSelector::Today);
    Ok(Json(
        state.pipeline.query().realtime(site_id, selector, Utc::now()),
    ))
}

#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pub site_id: Uuid,
    pub pages: Vec<String>,
}

/// GET /api/analytics/:site_id/pages - Distinct tracked page paths.
pub async fn pages_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
) -> Result<Json<PagesResponse>, ApiError> {
    state.sites.require_known(site_id).await?;
    Ok(Json(PagesResponse {
        site_id,
        pages: state.pipeline.query().pages(site_id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScrollmapQuery {
    pub page: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScrollmapResponse {
    pub site_id: Uuid,
    pub page: String,
    #[serde(flatten)]
    pub distribution: ScrollDistribution,
}

/// GET /api/analytics/:site_id/scrollmap - Scroll depth reach per decile.
pub async fn scrollmap_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Query(query): Query<ScrollmapQuery>,
) -> Result<Json<ScrollmapResponse>, ApiError> {
    state.sites.require_known(site_id).await?;
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::days(7));
    let distribution = state
        .pipeline
        .query()
        .scrollmap(site_id, &query.page, start, end);
    Ok(Json(ScrollmapResponse {
        site_id,
        page: query.page,
        distribution,
    }))
}
