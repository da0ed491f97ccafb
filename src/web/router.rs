//! Web application router and middleware setup.

use crate::reading::ReadingStore;
use crate::web::config::WebConfig;
use crate::web::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main axum application with all routes and middleware.
///
/// Unknown paths fall through to axum's default 404.
pub fn create_app(config: &WebConfig, store: Arc<ReadingStore>) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::dashboard))
        .route("/propane", get(handlers::propane_text))
        .route("/api/propane", get(handlers::propane_json))
        .route("/api/health", get(handlers::health_check))
        .with_state(store);

    // Add CORS if enabled
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
