//! Route definitions for the `/generations` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{generation, sweep};
use crate::state::AppState;

/// Routes mounted at `/generations`.
///
/// ```text
/// GET    /              -> list_generations
/// POST   /              -> create_generation
/// POST   /sweep         -> run_sweep
/// GET    /{id}          -> get_generation
/// POST   /{id}/query    -> query_generation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(generation::list_generations).post(generation::create_generation),
        )
        .route("/sweep", post(sweep::run_sweep))
        .route("/{id}", get(generation::get_generation))
        .route("/{id}/query", post(generation::query_generation))
}
