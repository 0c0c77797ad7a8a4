//! Success notifications.
//!
//! The [`Notifier`] is best-effort: it is called after the task write has
//! landed and any error is logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use genflow_core::generation::MediaKind;
use genflow_core::notification::{preview, success_title, task_link, KIND_GENERATION_SUCCESS};
use genflow_db::models::generation_task::GenerationTask;
use genflow_db::models::notification::CreateNotification;
use genflow_db::repositories::NotificationRepo;
use sqlx::PgPool;

/// Durable destination for user notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Store a notification. Returns `false` when an identical notification
    /// for the same source task already exists.
    async fn create(&self, input: &CreateNotification) -> Result<bool, sqlx::Error>;
}

/// [`NotificationSink`] backed by the `notifications` table.
#[derive(Clone)]
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn create(&self, input: &CreateNotification) -> Result<bool, sqlx::Error> {
        Ok(NotificationRepo::create(&self.pool, input).await?.is_some())
    }
}

/// Emits "your generation is ready" notifications.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    app_url: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, app_url: impl Into<String>) -> Self {
        Self {
            sink,
            app_url: app_url.into(),
        }
    }

    /// Only image and video results are announced.
    pub fn announces(kind: MediaKind) -> bool {
        matches!(kind, MediaKind::Image | MediaKind::Video)
    }

    /// Build the notification for a task that just reached `success`.
    pub fn build(&self, task: &GenerationTask, media_url: Option<&str>) -> CreateNotification {
        CreateNotification {
            user_id: task.user_id,
            kind: KIND_GENERATION_SUCCESS.to_string(),
            title: success_title(task.media_kind),
            content: preview(&task.prompt),
            link: Some(task_link(&self.app_url, task.media_kind, task.id)),
            media_url: media_url.map(String::from),
            source_task_id: Some(task.id),
        }
    }

    /// Record a success notification for `task`. Never fails.
    pub async fn task_succeeded(&self, task: &GenerationTask, media_url: Option<&str>) {
        if !Self::announces(task.media_kind) {
            return;
        }

        let input = self.build(task, media_url);
        match self.sink.create(&input).await {
            Ok(true) => {
                tracing::info!(task_id = task.id, user_id = task.user_id, "Success notification created");
            }
            Ok(false) => {
                tracing::debug!(task_id = task.id, "Success notification already exists");
            }
            Err(e) => {
                tracing::error!(task_id = task.id, error = %e, "Failed to create success notification");
            }
        }
    }
}
