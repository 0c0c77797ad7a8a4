//! Generation task entity, insert DTO, partial-update patch and list filter.

use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{GenerationOptions, TaskInfo, TaskResult};
use genflow_core::types::{Credits, DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `generation_tasks` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct GenerationTask {
    pub id: DbId,
    pub user_id: DbId,
    #[sqlx(try_from = "String")]
    pub media_kind: MediaKind,
    pub provider: String,
    pub model: String,
    pub scene: String,
    pub prompt: String,
    pub options: Json<GenerationOptions>,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: TaskStatus,
    pub external_job_id: Option<String>,
    pub task_info: Option<Json<TaskInfo>>,
    pub task_result: Option<Json<TaskResult>>,
    /// Bumped on every write of `task_result`.
    pub result_version: i64,
    pub cost_credits: Credits,
    pub credit_transaction_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl GenerationTask {
    pub fn info(&self) -> Option<&TaskInfo> {
        self.task_info.as_ref().map(|j| &j.0)
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.task_result.as_ref().map(|j| &j.0)
    }

    /// Apply `patch` in memory the same way `GenerationTaskRepo::update_by_id`
    /// applies it in SQL.
    pub fn apply(&mut self, patch: &GenerationTaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(id) = &patch.external_job_id {
            self.external_job_id = Some(id.clone());
        }
        if let Some(info) = &patch.task_info {
            self.task_info = Some(Json(info.clone()));
        }
        if let Some(result) = &patch.task_result {
            self.task_result = Some(Json(result.clone()));
            self.result_version += 1;
        }
        if let Some(tx) = patch.credit_transaction_id {
            self.credit_transaction_id = Some(tx);
        }
    }
}

/// DTO for inserting a new task. Status starts at `pending`.
#[derive(Debug, Clone)]
pub struct CreateGenerationTask {
    pub user_id: DbId,
    pub media_kind: MediaKind,
    pub provider: String,
    pub model: String,
    pub scene: String,
    pub prompt: String,
    pub options: GenerationOptions,
    pub cost_credits: Credits,
    pub credit_transaction_id: Option<DbId>,
}

/// Partial update: only `Some` fields are written, the rest keep their
/// stored values. Payloads replace the stored document wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationTaskPatch {
    pub status: Option<TaskStatus>,
    pub external_job_id: Option<String>,
    pub task_info: Option<TaskInfo>,
    pub task_result: Option<TaskResult>,
    pub credit_transaction_id: Option<DbId>,
}

impl GenerationTaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Filter for list/count queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct GenerationTaskFilter {
    pub user_id: Option<DbId>,
    pub media_kind: Option<MediaKind>,
    pub statuses: Vec<TaskStatus>,
}

impl GenerationTaskFilter {
    pub fn matches(&self, task: &GenerationTask) -> bool {
        self.user_id.map_or(true, |u| u == task.user_id)
            && self.media_kind.map_or(true, |k| k == task.media_kind)
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
    }
}

/// Page-based pagination. `page` is 1-based.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

/// Maximum page size for task listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
pub const DEFAULT_LIMIT: i64 = 20;

impl Page {
    /// Clamp user-supplied values into a valid page.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}
