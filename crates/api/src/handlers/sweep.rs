//! Handler for the reconciliation sweep trigger.

use axum::extract::State;
use axum::Json;
use genflow_pipeline::SweepReport;

use crate::error::AppResult;
use crate::middleware::sweep::SweepAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/generations/sweep
///
/// Drive one batch of unfinished tasks through the query coordinator and
/// report what happened. Tasks another caller is already querying are
/// counted as skipped.
pub async fn run_sweep(
    _auth: SweepAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SweepReport>>> {
    let report = state.sweeper.run_once().await?;
    Ok(Json(DataResponse { data: report }))
}
