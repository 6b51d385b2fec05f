//! CSV export endpoint.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/export/:site_id/csv - Summary metrics as a CSV download.
pub async fn csv_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.sites.require_known(site_id).await?;
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::days(7));
    let csv = state.pipeline.query().summary_csv(site_id, start, end)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"analytics-{}-{}.csv\"",
                    site_id,
                    end.format("%Y%m%d")
                ),
            ),
        ],
        csv,
    ))
}
