use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use twiga_channels::{WhatsAppChannel, WhatsAppClient, WhatsAppOnMessageFn};
use twiga_common::{Error, GradeLevel, InboundMessage, Reply, Subject};
use twiga_config::AppConfig;
use twiga_db::TwigaStore;
use twiga_gateway::router::build_router;
use twiga_gateway::state::AppState;

fn noop_handler() -> WhatsAppOnMessageFn {
    Arc::new(|_: InboundMessage| Box::pin(async { Ok::<Option<Reply>, Error>(None) }))
}

async fn app(api_key: Option<&str>) -> Router {
    let mut config = AppConfig::default();
    config.gateway.api_key = api_key.map(str::to_string);

    let store = Arc::new(TwigaStore::in_memory().unwrap());
    store.get_or_create_user("255700000001", None).await.unwrap();
    store
        .create_class(Subject::Biology, GradeLevel::Os1)
        .await
        .unwrap();

    let channel = WhatsAppChannel::new(
        WhatsAppClient::new("token", "555").with_base_url("http://127.0.0.1:9"),
        "verify".into(),
        None,
        "fallback".into(),
        noop_handler(),
    );
    build_router(Arc::new(AppState::new(config, store)), Arc::new(channel))
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let resp = app(Some("secret-token"))
        .await
        .oneshot(get("/health", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_rejects_missing_api_key_if_configured() {
    let resp = app(Some("secret-token"))
        .await
        .oneshot(get("/api/status", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_rejects_wrong_api_key() {
    let resp = app(Some("secret-token"))
        .await
        .oneshot(get("/api/status", Some("wrong-token")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_reports_counts_with_correct_api_key() {
    let resp = app(Some("secret-token"))
        .await
        .oneshot(get("/api/status", Some("secret-token")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "running");
    assert_eq!(json["users"], 1);
    assert_eq!(json["classes"], 1);
}

#[tokio::test]
async fn status_is_open_without_configured_key() {
    let resp = app(None)
        .await
        .oneshot(get("/api/status", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_verification_is_mounted() {
    let resp = app(None)
        .await
        .oneshot(get(
            "/webhooks?hub.mode=subscribe&hub.verify_token=verify&hub.challenge=abc",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
