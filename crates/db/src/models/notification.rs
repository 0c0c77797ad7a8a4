//! Notification entity models and DTOs.

use genflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: DbId,
    pub user_id: DbId,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    /// Primary generated asset, for inline previews.
    pub media_url: Option<String>,
    pub source_task_id: Option<DbId>,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for creating a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateNotification {
    pub user_id: DbId,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub link: Option<String>,
    pub media_url: Option<String>,
    pub source_task_id: Option<DbId>,
}
