//! Web server and API endpoints for the propane dashboard.
//!
//! Serves the plain-text summary at `/propane`, a JSON snapshot at
//! `/api/propane`, a health check, and a dashboard page at `/` that polls the
//! JSON endpoint.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use handlers::PropaneResponse;
pub use router::create_app;

use crate::error::{BotError, Result};
use crate::reading::ReadingStore;
use crate::supervisor::Worker;
use async_trait::async_trait;
use axum::Router;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The HTTP presentation worker.
pub struct WebServer {
    config: WebConfig,
    store: Arc<ReadingStore>,
}

impl WebServer {
    pub fn new(config: WebConfig, store: Arc<ReadingStore>) -> Self {
        Self { config, store }
    }
}

#[async_trait]
impl Worker for WebServer {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            BotError::web_server_error(format!("Failed to bind to address {}: {}", addr, e))
        })?;

        info!("Starting web server on http://{}", addr);
        info!("Dashboard available at http://{}/", addr);
        info!("API endpoint: http://{}/api/propane", addr);

        let app = create_app(&self.config, Arc::clone(&self.store));
        serve_until_shutdown(listener, app, shutdown, self.config.shutdown_grace()).await
    }
}

/// Serve `app` until `shutdown` fires, then drain for at most `grace`.
///
/// Connections still open after the grace period are dropped; that is logged
/// but not treated as a failure.
pub async fn serve_until_shutdown(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|e| BotError::web_server_error(format!("Server error: {}", e)));
        }
        _ = shutdown.cancelled() => {
            info!("Web server received shutdown signal, draining connections");
        }
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => {
            result.map_err(|e| BotError::web_server_error(format!("Server error: {}", e)))?;
            info!("Web server stopped");
        }
        Err(_) => warn!("Web server did not drain within {:?}, forcing close", grace),
    }
    Ok(())
}
