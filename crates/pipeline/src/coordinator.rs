//! Query Coordinator.
//!
//! Guarantees at most one provider round-trip per task at a time. A caller
//! arriving while one is running gets [`PipelineError::QueryInProgress`]
//! straight away; it never waits and never writes.
//!
//! The round-trip runs on its own tokio task, so a caller that goes away
//! (client disconnect, request timeout) does not abort it: the provider
//! answer is still written for whoever asks next.

use std::sync::Arc;
use std::time::Duration;

use genflow_core::generation::TaskStatus;
use genflow_core::payload::TaskInfo;
use genflow_core::types::DbId;
use genflow_db::models::generation_task::{GenerationTask, GenerationTaskPatch};
use genflow_providers::ProviderRegistry;

use crate::error::PipelineError;
use crate::notifier::Notifier;
use crate::pending::PendingQueries;
use crate::reconciler::ResultReconciler;
use crate::store::TaskStore;
use crate::uploader::{AssetUploader, EnqueueOutcome, MigrationJob, STATE_MIGRATION_FAILED};

/// Default hold-back applied to end users while a task is still running.
pub const DEFAULT_POLL_DAMPING: Duration = Duration::from_secs(10);

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// An end user; must own the task and is subject to polling damping.
    User(DbId),
    /// Trusted internal caller such as the sweeper.
    System,
}

impl Caller {
    pub fn is_user(self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// Serialises provider status queries per task.
///
/// Cheap to clone; clones share the pending-query table.
#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    providers: ProviderRegistry,
    reconciler: ResultReconciler,
    uploader: AssetUploader,
    notifier: Notifier,
    pending: Arc<PendingQueries>,
    damping: Duration,
}

impl QueryCoordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        providers: ProviderRegistry,
        uploader: AssetUploader,
        notifier: Notifier,
        damping: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                providers,
                reconciler: ResultReconciler,
                uploader,
                notifier,
                pending: PendingQueries::new(),
                damping,
            }),
        }
    }

    /// The shared in-flight table.
    pub fn pending(&self) -> &Arc<PendingQueries> {
        &self.inner.pending
    }

    /// Refresh a task from its provider and return the stored snapshot.
    pub async fn query(&self, task_id: DbId, caller: Caller) -> Result<GenerationTask, PipelineError> {
        if self.inner.pending.is_pending(task_id) {
            return Err(PipelineError::QueryInProgress(task_id));
        }
        // Another caller may register between the check above and this
        // insert; the insert is the authoritative check.
        let guard = self
            .inner
            .pending
            .try_acquire(task_id, caller.is_user())
            .ok_or(PipelineError::QueryInProgress(task_id))?;

        let inner = Arc::clone(&self.inner);
        let round_trip = tokio::spawn(async move {
            let _guard = guard;
            inner.round_trip(task_id, caller).await
        });

        round_trip.await.map_err(|e| {
            tracing::error!(task_id, error = %e, "Query round-trip aborted");
            PipelineError::Internal(format!("Query round-trip for task {task_id} aborted"))
        })?
    }
}

impl Inner {
    async fn round_trip(&self, task_id: DbId, caller: Caller) -> Result<GenerationTask, PipelineError> {
        let task = self
            .store
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| PipelineError::task_not_found(task_id))?;

        let Some(external_job_id) = task.external_job_id.clone() else {
            return Err(PipelineError::NotTaskable(task_id));
        };

        if let Caller::User(user_id) = caller {
            if task.user_id != user_id {
                return Err(PipelineError::Forbidden(format!(
                    "Task {task_id} belongs to another user"
                )));
            }
        }

        // Terminal tasks never change status again; only the uploader may
        // still enrich their result.
        if task.status.is_terminal() {
            return Ok(task);
        }

        let adapter = self.providers.get(&task.provider)?;
        let response = match adapter
            .query(&external_job_id, task.media_kind, &task.model)
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    task_id,
                    provider = %task.provider,
                    error = %e,
                    "Transient provider error; returning stored state",
                );
                return Ok(task);
            }
            Err(e) => {
                tracing::error!(task_id, provider = %task.provider, error = %e, "Provider query failed");
                return Err(e.into());
            }
        };

        if caller.is_user() && response.status.is_in_progress() {
            tokio::time::sleep(self.damping).await;
        }

        let rec = self.reconciler.reconcile(&task, response);
        let Some(patch) = rec.patch else {
            tracing::debug!(task_id, status = %task.status, "Provider state unchanged");
            return Ok(task);
        };

        let updated = self
            .store
            .update_by_id(task_id, &patch)
            .await?
            .ok_or_else(|| PipelineError::task_not_found(task_id))?;

        tracing::info!(
            task_id,
            from = %task.status,
            to = %updated.status,
            "Task state updated from provider",
        );

        let updated = if rec.needs_migration {
            self.hand_off_migration(updated).await?
        } else {
            updated
        };

        if rec.first_success && updated.status == TaskStatus::Success {
            let media_url = updated.result().and_then(|r| r.primary_url()).map(String::from);
            self.notifier.task_succeeded(&updated, media_url.as_deref()).await;
        }

        Ok(updated)
    }

    /// Queue the stored result for migration. If the queue cannot take it,
    /// demote the task so a later poll tries again.
    async fn hand_off_migration(&self, task: GenerationTask) -> Result<GenerationTask, PipelineError> {
        let Some(result) = task.result().cloned() else {
            return Ok(task);
        };

        let job = MigrationJob {
            task_id: task.id,
            media_kind: task.media_kind,
            result_version: task.result_version,
            result,
        };
        match self.uploader.enqueue(job) {
            EnqueueOutcome::Queued | EnqueueOutcome::AlreadyQueued => Ok(task),
            EnqueueOutcome::Rejected => {
                let patch = GenerationTaskPatch {
                    status: Some(TaskStatus::Processing),
                    task_info: Some(TaskInfo::error(
                        STATE_MIGRATION_FAILED,
                        "Asset migration queue unavailable",
                    )),
                    ..Default::default()
                };
                let demoted = self
                    .store
                    .update_if_version(task.id, task.result_version, &patch)
                    .await?;
                Ok(demoted.unwrap_or(task))
            }
        }
    }
}
