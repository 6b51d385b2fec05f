//! Click heatmap endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_core::{DeviceClass, HeatmapCell, GRID};

use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClicksQuery {
    pub site_id: Uuid,
    pub page: String,
    pub device: Option<DeviceClass>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ClicksResponse {
    pub site_id: Uuid,
    pub page: String,
    /// Cells per axis; cell coordinates are `0..grid`
    pub grid: u32,
    pub points: Vec<HeatmapCell>,
}

/// GET /api/heatmap/clicks - Binned click positions for one page.
pub async fn clicks_handler(
    State(state): State<AppState>,
    Query(query): Query<ClicksQuery>,
) -> Result<Json<ClicksResponse>, ApiError> {
    state.sites.require_known(query.site_id).await?;
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::days(7));
    let points = state
        .pipeline
        .query()
        .heatmap(query.site_id, &query.page, query.device, start, end);
    Ok(Json(ClicksResponse {
        site_id: query.site_id,
        page: query.page,
        grid: GRID,
        points,
    }))
}
