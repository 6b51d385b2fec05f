//! Alert rule CRUD and evaluation tests.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use uuid::Uuid;

#[tokio::test]
async fn rule_lifecycle_create_list_delete() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    let created = server
        .post("/api/alerts/rules")
        .json(&fixtures::alert_rule(site.id, "pageview_spike", 100.0))
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let rule: serde_json::Value = created.json();
    assert_eq!(rule["active"], true);
    let rule_id = rule["id"].as_str().unwrap().to_string();

    let listed = server.get(&format!("/api/alerts/rules/{}", site.id)).await;
    listed.assert_status_ok();
    let rules: serde_json::Value = listed.json();
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let deleted = server
        .delete(&format!("/api/alerts/rules/{rule_id}"))
        .await;
    deleted.assert_status(axum::http::StatusCode::NO_CONTENT);

    // Soft delete: gone from the listing
    let listed = server.get(&format!("/api/alerts/rules/{}", site.id)).await;
    let rules: serde_json::Value = listed.json();
    assert!(rules.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rule_with_bad_email_is_rejected() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    let mut body = fixtures::alert_rule(site.id, "js_errors", 10.0);
    body["notification_email"] = serde_json::json!("not-an-email");

    let response = server.post("/api/alerts/rules").json(&body).await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rule_for_unknown_site_is_rejected() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .post("/api/alerts/rules")
        .json(&fixtures::alert_rule(Uuid::new_v4(), "bounce_rate", 90.0))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_missing_rule_is_404() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server
        .delete(&format!("/api/alerts/rules/{}", Uuid::new_v4()))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn breach_fires_a_notification() {
    let ctx = TestContext::new();
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let site = ctx.seed_site();

    server
        .post("/api/alerts/rules")
        .json(&fixtures::alert_rule(site.id, "pageview_spike", 2.0))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    for i in 0..3 {
        server
            .post("/api/track")
            .json(&fixtures::pageview(site.id, &format!("v{i}"), "/home"))
            .await
            .assert_status_ok();
    }
    ctx.drain();
    ctx.pipeline.evaluate_alerts().await;

    let response = server
        .get(&format!("/api/alerts/notifications/{}", site.id))
        .await;
    response.assert_status_ok();
    let notifications: serde_json::Value = response.json();
    let list = notifications.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["message"]
        .as_str()
        .unwrap()
        .contains("Pageview spike detected"));

    // A second pass inside the cooldown stays quiet
    ctx.pipeline.evaluate_alerts().await;
    let again: serde_json::Value = server
        .get(&format!("/api/alerts/notifications/{}", site.id))
        .await
        .json();
    assert_eq!(again.as_array().unwrap().len(), 1);
}
