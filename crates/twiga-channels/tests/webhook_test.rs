use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use serde_json::{Value, json};
use tower::ServiceExt;
use twiga_channels::whatsapp::webhook::{whatsapp_verify, whatsapp_webhook};
use twiga_channels::{WhatsAppChannel, WhatsAppClient, WhatsAppOnMessageFn};
use twiga_common::{Error, InboundMessage, Reply};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn echo_handler() -> WhatsAppOnMessageFn {
    Arc::new(|inbound: InboundMessage| {
        Box::pin(async move { Ok::<_, Error>(Some(Reply::text(format!("echo: {}", inbound.text)))) })
    })
}

fn failing_handler() -> WhatsAppOnMessageFn {
    Arc::new(|_: InboundMessage| {
        Box::pin(async { Err::<Option<Reply>, _>(Error::UserQuery("db down".into())) })
    })
}

fn router(graph_url: &str, app_secret: Option<&str>, on_message: WhatsAppOnMessageFn) -> Router {
    let client = WhatsAppClient::new("token", "555").with_base_url(graph_url);
    let channel = Arc::new(WhatsAppChannel::new(
        client,
        "verify-me".to_string(),
        app_secret.map(str::to_string),
        "Please contact support (dev@ai.or.tz) for assistance.".to_string(),
        on_message,
    ));
    Router::new()
        .route("/webhooks", get(whatsapp_verify).post(whatsapp_webhook))
        .with_state(channel)
}

fn message_event(text: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "changes": [{
                "value": {
                    "contacts": [{ "wa_id": "255700000001", "profile": { "name": "Amina" } }],
                    "messages": [{
                        "from": "255700000001",
                        "id": "wamid.1",
                        "type": "text",
                        "text": { "body": text }
                    }]
                }
            }]
        }]
    })
}

fn post(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Wait until the mock Graph API has seen `n` requests with a `to` field.
async fn wait_for_sends(server: &MockServer, n: usize) -> Vec<Value> {
    for _ in 0..50 {
        let sends: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter(|v| v.get("to").is_some())
            .collect();
        if sends.len() >= n {
            return sends;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {n} outbound sends");
}

#[tokio::test]
async fn verify_echoes_challenge_for_matching_token() {
    let app = router("http://127.0.0.1:9", None, echo_handler());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/webhooks?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"42");
}

#[tokio::test]
async fn verify_rejects_wrong_token() {
    let app = router("http://127.0.0.1:9", None, echo_handler());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/webhooks?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_message_events_are_acknowledged_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = router(&server.uri(), None, echo_handler());
    let status_event = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "read" }] } }] }]
    });
    let resp = app.oneshot(post(&status_event)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let app = router("http://127.0.0.1:9", None, echo_handler());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_signature_is_rejected_when_secret_configured() {
    let app = router("http://127.0.0.1:9", Some("app-secret"), echo_handler());
    let resp = app.oneshot(post(&message_event("hi"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn message_is_processed_and_reply_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/555/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let app = router(&server.uri(), None, echo_handler());
    let resp = app.oneshot(post(&message_event("hello"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let sends = wait_for_sends(&server, 1).await;
    assert_eq!(sends[0]["to"], "255700000001");
    assert_eq!(sends[0]["text"]["body"], "echo: hello");
}

#[tokio::test]
async fn handler_error_sends_fallback_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let app = router(&server.uri(), None, failing_handler());
    let resp = app.oneshot(post(&message_event("hello"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let sends = wait_for_sends(&server, 1).await;
    let body = sends[0]["text"]["body"].as_str().unwrap();
    assert!(body.contains("contact support"));
}
