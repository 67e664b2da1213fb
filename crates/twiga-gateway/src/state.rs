use std::sync::Arc;
use std::time::Instant;

use twiga_config::AppConfig;
use twiga_db::TwigaStore;

/// Shared application state accessible from the admin handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<TwigaStore>,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, store: Arc<TwigaStore>) -> Self {
        Self {
            config,
            store,
            started_at: Instant::now(),
        }
    }
}
