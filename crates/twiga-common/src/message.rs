use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A user message extracted from an inbound webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id, used for read receipts.
    pub message_id: String,
    /// Sender's WhatsApp id.
    pub wa_id: String,
    /// Profile name from the webhook contacts block, if present.
    pub name: Option<String>,
    /// Text body, or the title of the selected interactive option.
    pub text: String,
}

/// An outbound reply, optionally offering quick-reply options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    pub options: Option<Vec<String>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: None,
        }
    }

    pub fn with_options(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            options: Some(options),
        }
    }
}

/// Delivers replies to a user. Implemented by the WhatsApp client.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, to: &str, reply: &Reply) -> Result<()>;
}
