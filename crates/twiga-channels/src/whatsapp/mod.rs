pub mod api;
pub mod fmt;
pub mod payload;
pub mod webhook;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};
use twiga_common::{InboundMessage, Reply, ReplySender, Result};

use self::api::WhatsAppClient;

/// Callback invoked for each inbound user message.
///
/// `Ok(Some(reply))` is sent back to the user, `Ok(None)` means the handler
/// already replied (or nothing needs sending), and `Err` triggers the
/// channel's fallback text.
pub type WhatsAppOnMessageFn = Arc<
    dyn Fn(InboundMessage) -> Pin<Box<dyn Future<Output = Result<Option<Reply>>> + Send>>
        + Send
        + Sync,
>;

pub struct WhatsAppChannel {
    client: WhatsAppClient,
    verify_token: String,
    app_secret: Option<String>,
    fallback_text: String,
    on_message: WhatsAppOnMessageFn,
}

impl WhatsAppChannel {
    pub fn new(
        client: WhatsAppClient,
        verify_token: String,
        app_secret: Option<String>,
        fallback_text: String,
        on_message: WhatsAppOnMessageFn,
    ) -> Self {
        Self {
            client,
            verify_token,
            app_secret,
            fallback_text,
            on_message,
        }
    }

    pub fn client(&self) -> &WhatsAppClient {
        &self.client
    }

    /// Verify token expected by the webhook subscription handshake.
    pub fn verify_token(&self) -> &str {
        &self.verify_token
    }

    /// Meta app secret used for `X-Hub-Signature-256`, if configured.
    pub fn app_secret(&self) -> Option<&str> {
        self.app_secret.as_deref()
    }

    /// Run the message callback and deliver its outcome to the sender.
    pub async fn process(&self, inbound: InboundMessage) {
        let to = inbound.wa_id.clone();
        match (self.on_message)(inbound).await {
            Ok(Some(reply)) => {
                if let Err(e) = self.client.send_reply(&to, &reply).await {
                    warn!("whatsapp: failed to send reply to {to}: {e}");
                }
            }
            Ok(None) => info!("whatsapp: message from {to} handled without a direct reply"),
            Err(e) => {
                warn!("whatsapp: error processing message from {to}: {e}");
                if let Err(e) = self.client.send_text(&to, &self.fallback_text).await {
                    warn!("whatsapp: failed to send fallback to {to}: {e}");
                }
            }
        }
    }
}
