//! Query endpoint tests: ingest through the API, drain the pipeline, read
//! the aggregates back.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use uuid::Uuid;

#[tokio::test]
async fn summary_reflects_ingested_events() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    for (visitor, url) in [
        ("v1", "https://test.example.com/home"),
        ("v1", "https://test.example.com/pricing"),
        ("v2", "https://test.example.com/home?utm_source=mail"),
    ] {
        server
            .post("/api/track")
            .json(&fixtures::pageview(site.id, visitor, url))
            .await
            .assert_status_ok();
    }
    server
        .post("/api/track")
        .json(&fixtures::click(site.id, "v1", "https://test.example.com/home"))
        .await
        .assert_status_ok();

    ctx.drain();

    let response = server.get(&format!("/api/analytics/{}", site.id)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["pageviews"], 3);
    assert_eq!(body["clicks"], 1);
    assert_eq!(body["unique_visitors"], 2);
    // Query params fold into one page key
    assert_eq!(body["top_pages"][0]["key"], "/home");
    assert_eq!(body["top_pages"][0]["count"], 2);
    // No referrer reported
    assert_eq!(body["top_referrers"][0]["key"], "Direct");
}

#[tokio::test]
async fn summary_for_unknown_site_is_404() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get(&format!("/api/analytics/{}", Uuid::new_v4())).await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn realtime_counts_current_visitors() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    for visitor in ["v1", "v2", "v3"] {
        server
            .post("/api/track")
            .json(&fixtures::pageview(site.id, visitor, "/now"))
            .await
            .assert_status_ok();
    }
    ctx.drain();

    let response = server
        .get(&format!("/api/analytics/{}/realtime?range=today", site.id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["active_visitors"], 3);
    assert_eq!(body["pageviews"], 3);
}

#[tokio::test]
async fn pages_lists_distinct_paths() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    for url in ["/b", "/a", "/b"] {
        server
            .post("/api/track")
            .json(&fixtures::pageview(site.id, "v1", url))
            .await
            .assert_status_ok();
    }

    let response = server.get(&format!("/api/analytics/{}/pages", site.id)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["pages"], serde_json::json!(["/a", "/b"]));
}

#[tokio::test]
async fn heatmap_returns_binned_cells() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    for _ in 0..2 {
        server
            .post("/api/track")
            .json(&fixtures::click(site.id, "v1", "https://test.example.com/pricing"))
            .await
            .assert_status_ok();
    }
    ctx.drain();

    let response = server
        .get(&format!("/api/heatmap/clicks?site_id={}&page=/pricing", site.id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["grid"], 50);
    assert_eq!(body["points"][0]["cell_x"], 6);
    assert_eq!(body["points"][0]["cell_y"], 6);
    assert_eq!(body["points"][0]["count"], 2);
}

#[tokio::test]
async fn scrollmap_reports_max_depth_per_session() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    for depth in [30.0, 80.0] {
        server
            .post("/api/track")
            .json(&fixtures::scroll(site.id, "v1", "/article", depth))
            .await
            .assert_status_ok();
    }
    ctx.drain();

    let response = server
        .get(&format!("/api/analytics/{}/scrollmap?page=/article", site.id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_sessions"], 1);
    // One session, max depth 80% -> reached through decile 8
    assert_eq!(body["reached"][8], 1);
    assert_eq!(body["reached"][9], 0);
}

#[tokio::test]
async fn csv_export_downloads_summary() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    server
        .post("/api/track")
        .json(&fixtures::pageview(site.id, "v1", "/home"))
        .await
        .assert_status_ok();
    ctx.drain();

    let response = server.get(&format!("/api/export/{}/csv", site.id)).await;
    response.assert_status_ok();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
    let body = response.text();
    assert!(body.starts_with("metric,value\n"));
    assert!(body.contains("pageviews,1\n"));
}
