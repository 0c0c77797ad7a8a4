//! Task Store seam.
//!
//! The pipeline talks to persistence through [`TaskStore`] so the
//! coordination logic can be exercised without a database.

use async_trait::async_trait;
use genflow_core::types::DbId;
use genflow_db::models::generation_task::{
    CreateGenerationTask, GenerationTask, GenerationTaskFilter, GenerationTaskPatch, Page,
};
use genflow_db::repositories::GenerationTaskRepo;
use sqlx::PgPool;

/// Durable record of generation tasks.
///
/// `update_by_id` sets exactly the columns present in the patch; there is
/// no merging inside payload documents.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, input: &CreateGenerationTask) -> Result<GenerationTask, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<GenerationTask>, sqlx::Error>;

    async fn update_by_id(
        &self,
        id: DbId,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error>;

    /// Apply `patch` only if `result_version` still equals
    /// `expected_version`. `None` means the row is gone or has moved on.
    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error>;

    async fn list(
        &self,
        filter: &GenerationTaskFilter,
        page: Page,
    ) -> Result<Vec<GenerationTask>, sqlx::Error>;

    async fn count(&self, filter: &GenerationTaskFilter) -> Result<i64, sqlx::Error>;

    /// Up to `limit` submitted tasks still `pending` or `processing`,
    /// least recently swept first.
    async fn list_in_progress(&self, limit: i64) -> Result<Vec<GenerationTask>, sqlx::Error>;

    /// `pending`/`processing` tasks with no external job id.
    async fn count_unsubmitted_in_progress(&self) -> Result<i64, sqlx::Error>;

    async fn mark_swept(&self, ids: &[DbId]) -> Result<(), sqlx::Error>;
}

/// [`TaskStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, input: &CreateGenerationTask) -> Result<GenerationTask, sqlx::Error> {
        GenerationTaskRepo::create(&self.pool, input).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<GenerationTask>, sqlx::Error> {
        GenerationTaskRepo::find_by_id(&self.pool, id).await
    }

    async fn update_by_id(
        &self,
        id: DbId,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        GenerationTaskRepo::update_by_id(&self.pool, id, patch).await
    }

    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        GenerationTaskRepo::update_if_version(&self.pool, id, expected_version, patch).await
    }

    async fn list(
        &self,
        filter: &GenerationTaskFilter,
        page: Page,
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        GenerationTaskRepo::list(&self.pool, filter, page).await
    }

    async fn count(&self, filter: &GenerationTaskFilter) -> Result<i64, sqlx::Error> {
        GenerationTaskRepo::count(&self.pool, filter).await
    }

    async fn list_in_progress(&self, limit: i64) -> Result<Vec<GenerationTask>, sqlx::Error> {
        GenerationTaskRepo::list_in_progress(&self.pool, limit).await
    }

    async fn count_unsubmitted_in_progress(&self) -> Result<i64, sqlx::Error> {
        GenerationTaskRepo::count_unsubmitted_in_progress(&self.pool).await
    }

    async fn mark_swept(&self, ids: &[DbId]) -> Result<(), sqlx::Error> {
        GenerationTaskRepo::mark_swept(&self.pool, ids).await
    }
}
