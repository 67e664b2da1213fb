use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use ring::hmac;
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use twiga_common::InboundMessage;

use super::WhatsAppChannel;

/// Shared state passed to WhatsApp webhook handlers.
pub type WhatsAppState = Arc<WhatsAppChannel>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET handler for the webhook subscription handshake.
pub async fn whatsapp_verify(
    State(channel): State<WhatsAppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    let mode = params.mode.as_deref().unwrap_or("");
    let token = params.verify_token.as_deref().unwrap_or("");
    let challenge = params.challenge.as_deref().unwrap_or("");

    if mode != "subscribe" {
        return (StatusCode::FORBIDDEN, "invalid mode".to_string());
    }

    if !channel.verify_token().is_empty() && channel.verify_token() == token {
        info!("whatsapp: webhook verified");
        (StatusCode::OK, challenge.to_string())
    } else {
        warn!("whatsapp: webhook verification failed, token mismatch");
        (StatusCode::FORBIDDEN, "invalid verify token".to_string())
    }
}

/// POST handler for webhook events. Message events are processed in the
/// background so the platform gets its 200 immediately.
pub async fn whatsapp_webhook(
    State(channel): State<WhatsAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = channel.app_secret() {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, signature) {
            warn!("whatsapp: rejected webhook with invalid signature");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("whatsapp: webhook body is not valid JSON: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    if !is_valid_whatsapp_message(&payload) {
        debug!("whatsapp: ignoring non-message webhook event");
        return StatusCode::OK;
    }

    let Some(inbound) = parse_inbound_message(&payload) else {
        info!("whatsapp: ignoring unsupported message type");
        return StatusCode::OK;
    };

    info!(
        "whatsapp: message from {} ({} chars)",
        inbound.wa_id,
        inbound.text.len()
    );

    let read_channel = Arc::clone(&channel);
    let message_id = inbound.message_id.clone();
    tokio::spawn(async move {
        read_channel.client().mark_as_read(&message_id).await;
    });

    tokio::spawn(async move {
        channel.process(inbound).await;
    });

    StatusCode::OK
}

/// True only if `object` is set and `entry[0].changes[0].value.messages[0]`
/// exists and is non-empty.
pub fn is_valid_whatsapp_message(body: &Value) -> bool {
    let first_message = body
        .get("entry")
        .filter(|v| truthy(v))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("changes"))
        .filter(|v| truthy(v))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("value"))
        .filter(|v| truthy(v))
        .and_then(|v| v.get("messages"))
        .filter(|v| truthy(v))
        .and_then(|v| v.get(0));

    body.get("object").is_some_and(truthy) && first_message.is_some_and(truthy)
}

/// Extract the first message of a valid webhook event. Text bodies and
/// interactive button/list selections are supported; other types yield `None`.
pub fn parse_inbound_message(body: &Value) -> Option<InboundMessage> {
    let value = body.pointer("/entry/0/changes/0/value")?;
    let msg = value.pointer("/messages/0")?;

    let wa_id = msg.get("from")?.as_str()?.to_string();
    let message_id = msg
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let text = match msg.get("type").and_then(Value::as_str)? {
        "text" => msg.pointer("/text/body")?.as_str()?,
        "interactive" => msg
            .pointer("/interactive/button_reply/title")
            .or_else(|| msg.pointer("/interactive/list_reply/title"))?
            .as_str()?,
        "button" => msg.pointer("/button/text")?.as_str()?,
        _ => return None,
    };

    if text.trim().is_empty() {
        return None;
    }

    let name = value
        .get("contacts")
        .and_then(Value::as_array)
        .and_then(|contacts| {
            contacts.iter().find_map(|contact| {
                let contact_id = contact.get("wa_id").and_then(Value::as_str)?;
                if contact_id != wa_id {
                    return None;
                }
                contact
                    .pointer("/profile/name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
        });

    Some(InboundMessage {
        message_id,
        wa_id,
        name,
        text: text.trim().to_string(),
    })
}

/// Check an `X-Hub-Signature-256: sha256=<hex>` header against the
/// HMAC-SHA256 of the raw body.
pub fn verify_signature(app_secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(provided) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, app_secret.as_bytes());
    let tag = hmac::sign(&key, body);
    let expected: String = tag.as_ref().iter().map(|b| format!("{b:02x}")).collect();

    let provided = provided.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
