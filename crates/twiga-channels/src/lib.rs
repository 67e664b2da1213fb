pub mod whatsapp;

pub use whatsapp::api::WhatsAppClient;
pub use whatsapp::fmt::format_text_for_whatsapp;
pub use whatsapp::webhook::{is_valid_whatsapp_message, parse_inbound_message, verify_signature};
pub use whatsapp::{WhatsAppChannel, WhatsAppOnMessageFn};
