use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};

use courier_messaging::config::EmptyCampaignPolicy;
use courier_messaging::infra::provider::HttpProviders;
use courier_messaging::router::build_router;
use courier_messaging::state::AppState;
use courier_messaging::usecase::chatbot::ChatSettings;
use courier_messaging::usecase::webhook::{SIGNATURE_HEADER, sign};

use crate::helpers::{greeting_flow, instant_policy};

const APP_SECRET: &str = "s3cret";

fn server() -> TestServer {
    let state = AppState {
        db: DatabaseConnection::Disconnected,
        providers: HttpProviders::new(None, None, Duration::from_secs(1)).unwrap(),
        flow: Arc::new(greeting_flow()),
        webhook_verify_token: "verify-me".to_owned(),
        whatsapp_app_secret: Some(APP_SECRET.to_owned()),
        retry_policy: instant_policy(),
        chat: ChatSettings {
            hop_cap: 10,
            idle_timeout: chrono::Duration::minutes(30),
        },
        empty_campaign_policy: EmptyCampaignPolicy::NotFound,
        worker_batch_size: 10,
    };
    TestServer::new(build_router(state)).unwrap()
}

#[tokio::test]
async fn should_report_liveness() {
    let response = server().get("/healthz").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn should_report_not_ready_without_database() {
    let response = server().get("/readyz").await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn should_echo_challenge_for_valid_subscription() {
    let response = server()
        .get("/webhook")
        .add_query_param("hub.mode", "subscribe")
        .add_query_param("hub.verify_token", "verify-me")
        .add_query_param("hub.challenge", "1158201444")
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "1158201444");
}

#[tokio::test]
async fn should_reject_subscription_with_wrong_token() {
    let response = server()
        .get("/webhook")
        .add_query_param("hub.mode", "subscribe")
        .add_query_param("hub.verify_token", "guess")
        .add_query_param("hub.challenge", "1158201444")
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn should_reject_unsigned_webhook() {
    let response = server()
        .post("/webhook")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_static("sha256=00"),
        )
        .bytes(Bytes::from_static(br#"{"entry":[]}"#))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["kind"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn should_acknowledge_signed_webhook() {
    let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
    let signature = sign(APP_SECRET, body);

    let response = server()
        .post("/webhook")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_str(&signature).unwrap(),
        )
        .bytes(Bytes::from_static(body))
        .await;

    response.assert_status_ok();
    let summary: Value = response.json();
    assert_eq!(summary["messages_handled"], 0);
    assert_eq!(summary["receipts_applied"], 0);
}

#[tokio::test]
async fn should_acknowledge_signed_but_undecodable_webhook() {
    let body = b"not json";
    let signature = sign(APP_SECRET, body);

    let response = server()
        .post("/webhook")
        .add_header(
            HeaderName::from_static(SIGNATURE_HEADER),
            HeaderValue::from_str(&signature).unwrap(),
        )
        .bytes(Bytes::from_static(body))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn should_preview_flow_without_sending() {
    let response = server()
        .post("/webhook/test-message")
        .json(&json!({ "text": "hello" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["matched"], true);
    assert_eq!(body["node_id"], "ask_name");
    assert_eq!(body["responses"], json!(["What's your name?"]));
    assert_eq!(body["session_id"], Value::Null);
}

#[tokio::test]
async fn should_preview_from_current_node_with_variables() {
    let response = server()
        .post("/webhook/test-message")
        .json(&json!({
            "text": "1",
            "current_node_id": "greet",
            "variables": { "name": "Ada" }
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["responses"], json!(["No news today, Ada."]));
}

#[tokio::test]
async fn should_require_contact_to_dispatch_test_message() {
    let response = server()
        .post("/webhook/test-message")
        .json(&json!({ "text": "hello", "dispatch": true }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "INVALID_INPUT");
}

#[tokio::test]
async fn should_report_unconfigured_provider() {
    let response = server().post("/providers/sms/test").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "CONFIG_ERROR");
}

#[tokio::test]
async fn should_reject_unknown_channel() {
    let response = server().post("/providers/fax/test").await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["kind"], "INVALID_INPUT");
}
