//! End-to-end tests for the collection path.
//!
//! POST /api/track through the real router, middleware, and event store.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use uuid::Uuid;

#[tokio::test]
async fn pageview_is_admitted_and_stored() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    let response = server
        .post("/api/track")
        .json(&fixtures::pageview(site.id, "visitor-1", "https://test.example.com/home"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["seq"], 1);
    assert!(body.get("degraded").is_none());

    assert_eq!(ctx.store.latest_seq(), 1);
}

#[tokio::test]
async fn unknown_site_is_rejected_404() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/api/track")
        .json(&fixtures::pageview(Uuid::new_v4(), "v1", "/home"))
        .await;

    response.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INGEST_001");
    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn inactive_site_is_rejected_403() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();
    ctx.directory.deactivate(site.id);

    let response = server
        .post("/api/track")
        .json(&fixtures::pageview(site.id, "v1", "/home"))
        .await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INGEST_002");
}

#[tokio::test]
async fn empty_visitor_id_is_rejected_400() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    let response = server
        .post("/api/track")
        .json(&fixtures::pageview(site.id, "", "/home"))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INGEST_003");
    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn click_without_coordinates_is_admitted_degraded() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    let response = server
        .post("/api/track")
        .json(&fixtures::degraded_click(site.id, "v1", "/home"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["degraded"], "missing_payload");
    assert_eq!(ctx.store.latest_seq(), 1);
}

#[tokio::test]
async fn sustained_overrun_is_shed_429() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    // rate 1/s, burst 5
    let site = ctx.seed_site_with_rate(1);

    for i in 0..5 {
        let response = server
            .post("/api/track")
            .json(&fixtures::pageview(site.id, &format!("v{i}"), "/home"))
            .await;
        response.assert_status_ok();
    }

    let shed = server
        .post("/api/track")
        .json(&fixtures::pageview(site.id, "v5", "/home"))
        .await;
    shed.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = shed.json();
    assert_eq!(body["code"], "RATE_001");
    assert!(shed.headers().contains_key("Retry-After"));

    // The shed event was dropped, not queued
    assert_eq!(ctx.store.latest_seq(), 5);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let health = server.get("/health").await;
    health.assert_status_ok();
    let body: serde_json::Value = health.json();
    assert_eq!(body["store_healthy"], true);

    server.get("/health/ready").await.assert_status_ok();
    server.get("/health/live").await.assert_status_ok();
}
