pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AppConfig, BotConfig, DatabaseConfig, EmbeddingConfig, GatewayConfig, LlmConfig,
    WhatsAppConfig,
};
