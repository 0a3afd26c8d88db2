//! Route definitions for the HTTP API.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;

use super::handlers::{self, AppState};

/// Extra room on top of the configured upload ceiling for multipart
/// boundaries and headers.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the application router with all API routes.
pub fn create_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/upload/file", post(handlers::upload_file))
        .route("/upload/files", post(handlers::upload_files))
        .route("/files", get(handlers::list_files))
        .route("/download/files/:id", get(handlers::download_file))
        .route("/download/files-zip", get(handlers::download_zip))
        .route("/download/files-base64", get(handlers::download_base64))
        .route("/rename/file/:id", put(handlers::rename_file))
        .route("/delete/file/:id", delete(handlers::delete_file))
        .layer(DefaultBodyLimit::max(
            config.storage.max_upload_bytes() as usize + BODY_LIMIT_SLACK,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the health-check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(|| async { "OK" }))
}
