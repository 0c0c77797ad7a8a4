//! Repository for the `generation_tasks` table.
//!
//! Status values are written through [`TaskStatus::id`]; payload columns are
//! bound as [`Json`] and replaced wholesale.

use genflow_core::generation::TaskStatus;
use genflow_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::generation_task::{
    CreateGenerationTask, GenerationTask, GenerationTaskFilter, GenerationTaskPatch, Page,
};

/// Column list for `generation_tasks` queries.
const COLUMNS: &str = "\
    id, user_id, media_kind, provider, model, scene, prompt, options, \
    status_id, external_job_id, task_info, task_result, result_version, \
    cost_credits, credit_transaction_id, created_at, updated_at";

/// [`COLUMNS`] qualified for queries joining other tables.
const SWEEP_COLUMNS: &str = "\
    t.id, t.user_id, t.media_kind, t.provider, t.model, t.scene, t.prompt, t.options, \
    t.status_id, t.external_job_id, t.task_info, t.task_result, t.result_version, \
    t.cost_credits, t.credit_transaction_id, t.created_at, t.updated_at";

/// Filter clause shared by `list` and `count`. Binds `$1..$3`.
const FILTER: &str = "\
    ($1::BIGINT IS NULL OR user_id = $1) \
    AND ($2::TEXT IS NULL OR media_kind = $2) \
    AND (cardinality($3::SMALLINT[]) = 0 OR status_id = ANY($3))";

/// `SET` clause shared by both update flavours. Binds `$2..$6`.
const PATCH_SET: &str = "\
    status_id = COALESCE($2, status_id), \
    external_job_id = COALESCE($3, external_job_id), \
    task_info = COALESCE($4, task_info), \
    task_result = COALESCE($5, task_result), \
    result_version = result_version + CASE WHEN $5::JSONB IS NULL THEN 0 ELSE 1 END, \
    credit_transaction_id = COALESCE($6, credit_transaction_id)";

/// Provides CRUD operations for generation tasks.
pub struct GenerationTaskRepo;

impl GenerationTaskRepo {
    /// Insert a new `pending` task, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGenerationTask,
    ) -> Result<GenerationTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_tasks \
                 (user_id, media_kind, provider, model, scene, prompt, options, \
                  status_id, cost_credits, credit_transaction_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(input.user_id)
            .bind(input.media_kind.as_str())
            .bind(&input.provider)
            .bind(&input.model)
            .bind(&input.scene)
            .bind(&input.prompt)
            .bind(Json(&input.options))
            .bind(TaskStatus::Pending.id())
            .bind(input.cost_credits)
            .bind(input.credit_transaction_id)
            .fetch_one(pool)
            .await
    }

    /// Find a task by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GenerationTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generation_tasks WHERE id = $1");
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set the columns present in `patch`.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update_by_id(
        pool: &PgPool,
        id: DbId,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_tasks SET {PATCH_SET} \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Self::bind_patch(sqlx::query_as::<_, GenerationTask>(&query), id, patch)
            .fetch_optional(pool)
            .await
    }

    /// Like [`update_by_id`](Self::update_by_id), but only when
    /// `result_version` still equals `expected_version`.
    ///
    /// Returns `None` when the row is missing or its version has moved on.
    pub async fn update_if_version(
        pool: &PgPool,
        id: DbId,
        expected_version: i64,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        let query = format!(
            "UPDATE generation_tasks SET {PATCH_SET} \
             WHERE id = $1 AND result_version = $7 \
             RETURNING {COLUMNS}"
        );
        Self::bind_patch(sqlx::query_as::<_, GenerationTask>(&query), id, patch)
            .bind(expected_version)
            .fetch_optional(pool)
            .await
    }

    /// List tasks matching `filter`, newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &GenerationTaskFilter,
        page: Page,
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_tasks \
             WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(filter.user_id)
            .bind(filter.media_kind.map(|k| k.as_str()))
            .bind(status_ids(&filter.statuses))
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(pool)
            .await
    }

    /// Count tasks matching `filter`.
    pub async fn count(pool: &PgPool, filter: &GenerationTaskFilter) -> Result<i64, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM generation_tasks WHERE {FILTER}");
        sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.user_id)
            .bind(filter.media_kind.map(|k| k.as_str()))
            .bind(status_ids(&filter.statuses))
            .fetch_one(pool)
            .await
    }

    /// Submitted tasks still `pending` or `processing`, for the sweeper.
    ///
    /// Never-swept tasks come first, then the least recently swept, so rows
    /// the provider keeps rejecting cannot starve the rest of the queue.
    pub async fn list_in_progress(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let query = format!(
            "SELECT {SWEEP_COLUMNS} FROM generation_tasks t \
             LEFT JOIN generation_task_sweeps s ON s.task_id = t.id \
             WHERE t.status_id IN ($1, $2) AND t.external_job_id IS NOT NULL \
             ORDER BY s.last_swept_at ASC NULLS FIRST, t.updated_at ASC, t.id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, GenerationTask>(&query)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Processing.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Number of `pending`/`processing` tasks whose submission never
    /// recorded an external job id.
    pub async fn count_unsubmitted_in_progress(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM generation_tasks \
             WHERE status_id IN ($1, $2) AND external_job_id IS NULL",
        )
        .bind(TaskStatus::Pending.id())
        .bind(TaskStatus::Processing.id())
        .fetch_one(pool)
        .await
    }

    /// Record that the sweeper has visited `ids`.
    pub async fn mark_swept(pool: &PgPool, ids: &[DbId]) -> Result<(), sqlx::Error> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO generation_task_sweeps (task_id, last_swept_at) \
             SELECT UNNEST($1::BIGINT[]), NOW() \
             ON CONFLICT (task_id) DO UPDATE SET last_swept_at = EXCLUDED.last_swept_at",
        )
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(())
    }

    // ---- private helpers ----

    fn bind_patch<'q>(
        query: sqlx::query::QueryAs<'q, sqlx::Postgres, GenerationTask, sqlx::postgres::PgArguments>,
        id: DbId,
        patch: &'q GenerationTaskPatch,
    ) -> sqlx::query::QueryAs<'q, sqlx::Postgres, GenerationTask, sqlx::postgres::PgArguments> {
        query
            .bind(id)
            .bind(patch.status.map(TaskStatus::id))
            .bind(patch.external_job_id.as_deref())
            .bind(patch.task_info.as_ref().map(Json))
            .bind(patch.task_result.as_ref().map(Json))
            .bind(patch.credit_transaction_id)
    }
}

fn status_ids(statuses: &[TaskStatus]) -> Vec<i16> {
    statuses.iter().map(|s| s.id()).collect()
}
