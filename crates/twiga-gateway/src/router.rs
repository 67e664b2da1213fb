use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use twiga_channels::whatsapp::webhook::{WhatsAppState, whatsapp_verify, whatsapp_webhook};

use crate::state::SharedState;

/// Build the application router: admin endpoints plus the WhatsApp webhook.
pub fn build_router(state: SharedState, whatsapp: WhatsAppState) -> Router {
    let api = Router::new()
        .route("/api/status", get(status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .with_state(state);

    let webhooks = Router::new()
        .route("/webhooks", get(whatsapp_verify).post(whatsapp_webhook))
        .with_state(whatsapp);

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn status(
    State(state): State<SharedState>,
) -> Result<axum::Json<serde_json::Value>, StatusCode> {
    let users = state
        .store
        .count_users()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let classes = state
        .store
        .list_classes()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .len();

    Ok(axum::Json(serde_json::json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "users": users,
        "classes": classes,
    })))
}

/// Require `Authorization: Bearer <gateway.api_key>` when a key is configured.
async fn require_api_key(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.gateway.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(req).await);
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}
