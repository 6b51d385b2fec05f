//! Alert rule and notification endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use pulse_core::{AlertNotification, AlertRule, AlertRuleCreate};

use crate::response::ApiError;
use crate::state::AppState;

const DEFAULT_NOTIFICATION_LIMIT: usize = 50;

/// POST /api/alerts/rules - Create an alert rule.
pub async fn create_rule_handler(
    State(state): State<AppState>,
    Json(create): Json<AlertRuleCreate>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    state.sites.require_known(create.site_id).await?;
    let rule = state.pipeline.rules().create(create)?;
    info!(
        rule_id = %rule.id,
        site_id = %rule.site_id,
        condition = rule.condition.as_str(),
        threshold = rule.threshold,
        "alert rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/alerts/rules/:id - Active rules for a site, newest first.
pub async fn list_rules_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
) -> Result<Json<Vec<AlertRule>>, ApiError> {
    state.sites.require_known(site_id).await?;
    Ok(Json(state.pipeline.rules().list_for_site(site_id)))
}

/// DELETE /api/alerts/rules/:id - Deactivate a rule.
pub async fn delete_rule_handler(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.rules().delete(rule_id)?;
    info!(%rule_id, "alert rule deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    pub limit: Option<usize>,
}

/// GET /api/alerts/notifications/:site_id - Recent fired notifications.
pub async fn notifications_handler(
    State(state): State<AppState>,
    Path(site_id): Path<Uuid>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<AlertNotification>>, ApiError> {
    state.sites.require_known(site_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT);
    Ok(Json(state.pipeline.notifications().recent(site_id, limit)))
}
