//! Handlers for the `/generations` resource.
//!
//! All endpoints require authentication via [`AuthUser`] and only ever see
//! the caller's own tasks.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use genflow_core::error::CoreError;
use genflow_core::generation::{GenerationRequest, MediaKind, TaskStatus};
use genflow_core::types::DbId;
use genflow_db::models::generation_task::{GenerationTask, GenerationTaskFilter, Page};
use genflow_db::repositories::GenerationTaskRepo;
use genflow_pipeline::Caller;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::{DataResponse, PageResponse};
use crate::state::AppState;

/// Query parameters for `GET /generations`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerationListQuery {
    /// `image`, `video` or `music`.
    pub media_kind: Option<String>,
    /// Comma-separated statuses, e.g. `pending,processing`.
    pub status: Option<String>,
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Page size. Defaults to 20, clamped to 1..=100.
    pub limit: Option<i64>,
}

impl GenerationListQuery {
    fn filter(&self, user_id: DbId) -> Result<GenerationTaskFilter, CoreError> {
        let media_kind = self
            .media_kind
            .as_deref()
            .map(MediaKind::from_str)
            .transpose()?;

        let statuses = self
            .status
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(TaskStatus::from_str)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(GenerationTaskFilter {
            user_id: Some(user_id),
            media_kind,
            statuses,
        })
    }
}

/// POST /api/v1/generations
///
/// Validate, price and charge the request, then submit it to its provider.
/// Returns 201 with the task, which carries the provider's job id.
pub async fn create_generation(
    auth: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let task = state.submission.submit(auth.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

/// POST /api/v1/generations/{id}/query
///
/// Refresh the task from its provider. Unfinished tasks are answered after
/// the poll damping delay; a concurrent query for the same task yields
/// 409 `QUERY_IN_PROGRESS`.
pub async fn query_generation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let task = state
        .coordinator
        .query(task_id, Caller::User(auth.user_id))
        .await?;
    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/generations/{id}
///
/// The stored snapshot, without contacting the provider.
pub async fn get_generation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<Json<DataResponse<GenerationTask>>> {
    let task = GenerationTaskRepo::find_by_id(&state.pool, task_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::task_not_found(task_id)))?;

    if task.user_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Task {task_id} belongs to another user"
        ))));
    }

    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/generations
///
/// The caller's tasks, newest first.
pub async fn list_generations(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<GenerationListQuery>,
) -> AppResult<Json<PageResponse<GenerationTask>>> {
    let filter = params.filter(auth.user_id)?;
    let page = Page::new(params.page, params.limit);

    let (tasks, total) = tokio::try_join!(
        GenerationTaskRepo::list(&state.pool, &filter, page),
        GenerationTaskRepo::count(&state.pool, &filter),
    )?;

    Ok(Json(PageResponse {
        data: tasks,
        total,
        page: page.page,
        limit: page.limit,
    }))
}
