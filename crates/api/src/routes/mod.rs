//! API routes.

pub mod alerts;
pub mod analytics;
pub mod export;
pub mod health;
pub mod heatmap;
pub mod ingest;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/track", post(ingest::track_handler))
        .route("/api/analytics/:site_id", get(analytics::summary_handler))
        .route(
            "/api/analytics/:site_id/realtime",
            get(analytics::realtime_handler),
        )
        .route(
            "/api/analytics/:site_id/pages",
            get(analytics::pages_handler),
        )
        .route(
            "/api/analytics/:site_id/scrollmap",
            get(analytics::scrollmap_handler),
        )
        .route("/api/heatmap/clicks", get(heatmap::clicks_handler))
        .route("/api/alerts/rules", post(alerts::create_rule_handler))
        .route(
            "/api/alerts/rules/:id",
            get(alerts::list_rules_handler).delete(alerts::delete_rule_handler),
        )
        .route(
            "/api/alerts/notifications/:site_id",
            get(alerts::notifications_handler),
        )
        .route("/api/export/:site_id/csv", get(export::csv_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
