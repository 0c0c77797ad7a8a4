pub mod generation;
pub mod health;
pub mod notification;

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /generations                     submit (POST), list (GET)
/// /generations/sweep               reconciliation sweep (POST, shared secret)
/// /generations/{id}                stored snapshot (GET)
/// /generations/{id}/query          provider status query (POST)
///
/// /notifications                   caller's notifications (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/generations", generation::router())
        .nest("/notifications", notification::router())
}

/// Serve migrated media from the local storage directory at `/files`.
///
/// Only used with the local backend; S3 objects are served by the bucket.
pub fn local_files(dir: &std::path::Path) -> Router<AppState> {
    Router::new().nest_service("/files", ServeDir::new(dir))
}
