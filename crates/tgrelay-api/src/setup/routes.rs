//! Route configuration and setup

use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tgrelay_core::Config;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing and text fields around one chunk.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let chunk_body_limit = config.transfer().max_chunk_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/config", get(handlers::config::client_config))
        .route("/verify", post(handlers::verify::verify_password))
        // Streamed and split while reading, so no whole-body limit applies.
        .route(
            "/upload",
            post(handlers::upload::upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload_chunk",
            post(handlers::upload::upload_chunk)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(chunk_body_limit)),
        )
        .route("/merge_chunks", post(handlers::upload::merge_chunks))
        .route("/d", get(handlers::download::download_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
