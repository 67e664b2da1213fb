use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use twiga_common::{Error, Reply, ReplySender, Result};

use super::payload::{self, OutboundMessage};

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v21.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct WhatsAppReadReceipt<'a> {
    messaging_product: &'static str,
    status: &'static str,
    message_id: &'a str,
}

/// Client for the Graph API `/{phone_number_id}/messages` endpoint.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    access_token: String,
    phone_number_id: String,
    base_url: String,
    api_version: String,
}

impl WhatsAppClient {
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
            base_url: DEFAULT_GRAPH_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    /// Point the client at another Graph API host (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn phone_number_id(&self) -> &str {
        &self.phone_number_id
    }

    fn messages_endpoint(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            self.phone_number_id
        )
    }

    /// POST an outbound envelope.
    pub async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.post(message, "send message").await
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        self.send(&payload::text_message(to, text)).await
    }

    /// Mark an inbound message as read. Failures are logged, not returned.
    pub async fn mark_as_read(&self, message_id: &str) {
        let receipt = WhatsAppReadReceipt {
            messaging_product: "whatsapp",
            status: "read",
            message_id,
        };
        if let Err(e) = self.post(&receipt, "mark_as_read").await {
            warn!("whatsapp: {e}");
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T, action: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.messages_endpoint())
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("WhatsApp {action} failed: {e}")))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        log_response(action, status, &text);

        if !status.is_success() {
            return Err(Error::Channel(format!(
                "WhatsApp API error on {action} {status}: {text}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySender for WhatsAppClient {
    async fn send_reply(&self, to: &str, reply: &Reply) -> Result<()> {
        self.send(&payload::reply_message(to, reply)).await
    }
}

/// Log a Graph API response at a level matching its status class.
/// Credentials are never included.
fn log_response(action: &str, status: StatusCode, body: &str) {
    if status.is_success() {
        debug!("whatsapp {action}: {status} {body}");
    } else if status.is_redirection() {
        info!("whatsapp {action}: {status} {body}");
    } else if status.is_client_error() {
        warn!("whatsapp {action}: {status} {body}");
    } else {
        error!("whatsapp {action}: {status} {body}");
    }
}
