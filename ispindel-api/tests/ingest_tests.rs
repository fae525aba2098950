/// Integration tests for telemetry ingestion
///
/// Run with: cargo test --test ingest_tests -- --test-threads=1

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::TestContext;
use ispindel_shared::models::{Ispindel, Measurement};
use serde_json::{json, Value};

fn reading(gravity: f64) -> Value {
    json!({
        "name": "iSpindel000",
        "ID": 1234567,
        "angle": 52.3,
        "temperature": 19.5,
        "temp_units": "C",
        "battery": 4.02,
        "gravity": gravity,
        "interval": 900,
        "RSSI": -61
    })
}

#[tokio::test]
async fn test_unknown_api_key_is_unauthorized() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _, body) = ctx
        .post_body("/api/ispindel/does-not-exist", "application/json", reading(1.050).to_string())
        .await;
    let json: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid API key");
}

#[tokio::test]
async fn test_reading_is_stored_and_device_updated() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("ingest")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 1").await.unwrap();

    let (status, _, body) = ctx
        .post_body(
            &format!("/api/ispindel/{}", device.api_key),
            "application/json",
            reading(1.048).to_string(),
        )
        .await;
    let json: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["measurement"]["gravity"], 1.048);

    let stored = Measurement::latest_for_device(&ctx.db, device.id, 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].rssi, -61);
    assert_eq!(stored[0].device_id, "1234567");

    let refreshed = Ispindel::find_by_id(&ctx.db, device.id).await.unwrap().unwrap();
    assert!(refreshed.last_seen.is_some());
    assert_eq!(refreshed.device_id, "1234567");

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_second_reading_within_interval_is_rejected() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("interval")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 2").await.unwrap();
    let uri = format!("/api/ispindel/{}", device.api_key);

    let (status, _, _) = ctx.post_body(&uri, "application/json", reading(1.050).to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = ctx.post_body(&uri, "application/json", reading(1.049).to_string()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let retry_after: i64 = headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);

    let stored = Measurement::latest_for_device(&ctx.db, device.id, 10).await.unwrap();
    assert_eq!(stored.len(), 1);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_generic_endpoint_reads_key_from_header() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("header")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 3").await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/ispindel")
        .header("content-type", "application/json")
        .header("X-API-KEY", &device.api_key)
        .body(Body::from(reading(1.040).to_string()))
        .unwrap();
    let (status, _, _) = ctx.send(request).await;

    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_generic_endpoint_reads_key_from_body() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("body")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 4").await.unwrap();

    let mut payload = reading(1.040);
    payload["token"] = json!(device.api_key);

    let (status, _, _) = ctx
        .post_body("/api/ispindel", "application/json", payload.to_string())
        .await;

    assert_eq!(status, StatusCode::OK);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_generic_endpoint_without_key() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _, body) = ctx
        .post_body("/api/ispindel", "application/json", reading(1.040).to_string())
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Missing API key"));
}

#[tokio::test]
async fn test_batch_skips_failing_items() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("batch")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 5").await.unwrap();

    // Second item falls inside the minimum interval of the first
    let batch = json!([reading(1.050), reading(1.049), "not an object"]);
    let (status, _, body) = ctx
        .post_body(&format!("/ispindel/{}", device.api_key), "application/json", batch.to_string())
        .await;
    let json: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["failed"], 2);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_plain_text_body_gets_a_note() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("plain")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 6").await.unwrap();

    let (status, _, body) = ctx
        .post_body(
            &format!("/api/ispindel/{}", device.api_key),
            "text/plain",
            "gravity=1.050".to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("plain text"));
    assert!(Measurement::latest_for_device(&ctx.db, device.id, 10).await.unwrap().is_empty());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("malformed")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 7").await.unwrap();

    let (status, _, _) = ctx
        .post_body(
            &format!("/api/ispindel/{}", device.api_key),
            "application/json",
            "{\"gravity\": 1.05".to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_whitespace_body_gets_a_note() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("blank")).await.unwrap();
    let device = ctx.create_device(&user, "Fermenter 8").await.unwrap();

    let (status, _, body) = ctx
        .post_body(&format!("/api/ispindel/{}", device.api_key), "text/plain", "   \n".to_string())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("plain text"));

    ctx.cleanup().await.unwrap();
}
