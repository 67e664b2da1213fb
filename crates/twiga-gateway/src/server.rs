use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use twiga_common::{Error, Result};
use twiga_config::AppConfig;
use twiga_db::TwigaStore;

use crate::bootstrap::build_whatsapp_channel;
use crate::router::build_router;
use crate::state::AppState;

/// The HTTP server: binds to a port and serves the webhook and admin API.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        let db_path = self.config.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Arc::new(TwigaStore::open(&db_path)?);

        let channel = Arc::new(build_whatsapp_channel(&self.config, Arc::clone(&store))?);
        let state = Arc::new(AppState::new(self.config, store));
        let app = build_router(state, channel);

        let listener = TcpListener::bind(&addr).await?;
        info!("Twiga gateway listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        info!("Twiga gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
