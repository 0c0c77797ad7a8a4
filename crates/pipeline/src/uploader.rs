//! Background Asset Uploader.
//!
//! Copies provider-hosted media into owned storage after a task has already
//! been reported as `success`. Work is handed over a bounded channel to a
//! single worker task; the request that produced the result never waits.
//!
//! Every write back to the task is a compare-and-set on the
//! `result_version` captured when the job was queued. If the stored result
//! has been replaced since, the worker's write is skipped: newer data wins.
//! On failure the task is demoted from `success` to `processing` so the
//! next poll or sweep re-evaluates it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::hashing::{extension_for, object_key, sha256_hex};
use genflow_core::payload::{TaskInfo, TaskResult};
use genflow_core::types::DbId;
use genflow_db::models::generation_task::GenerationTaskPatch;
use genflow_storage::{AssetFetcher, ObjectStorage, StorageError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::TaskStore;

/// Default channel bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// `task_info.state` written when a migration fails.
pub const STATE_MIGRATION_FAILED: &str = "migration_failed";

/// `task_info.state` written for jobs dropped at shutdown.
pub const STATE_MIGRATION_ABANDONED: &str = "migration_abandoned";

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub queue_capacity: usize,
    /// Leading segment of every object key.
    pub key_prefix: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            key_prefix: "generations".into(),
        }
    }
}

/// One task's result to migrate.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    pub task_id: DbId,
    pub media_kind: MediaKind,
    /// `result_version` of the row `result` was read from.
    pub result_version: i64,
    pub result: TaskResult,
}

/// Outcome of [`AssetUploader::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// A job for this task is already queued or running.
    AlreadyQueued,
    /// The queue is full or the worker has stopped.
    Rejected,
}

/// Totals reported by the worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploaderReport {
    pub migrated: u64,
    /// Results replaced before the write-back; nothing written.
    pub stale: u64,
    pub failed: u64,
    /// Still queued at shutdown.
    pub abandoned: u64,
}

enum JobOutcome {
    Migrated,
    Stale,
    Failed,
}

type InFlight = Arc<Mutex<HashSet<DbId>>>;

/// Cloneable handle for queueing migrations.
#[derive(Clone)]
pub struct AssetUploader {
    tx: mpsc::Sender<MigrationJob>,
    in_flight: InFlight,
}

impl AssetUploader {
    /// Start the worker. It runs until `cancel` fires or every handle is
    /// dropped.
    pub fn spawn(
        config: UploaderConfig,
        store: Arc<dyn TaskStore>,
        storage: Arc<dyn ObjectStorage>,
        fetcher: Arc<dyn AssetFetcher>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<UploaderReport>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let in_flight: InFlight = Arc::default();

        let worker = UploadWorker {
            store,
            storage,
            fetcher,
            key_prefix: config.key_prefix,
            in_flight: Arc::clone(&in_flight),
        };
        let handle = tokio::spawn(worker.run(rx, cancel));

        (Self { tx, in_flight }, handle)
    }

    /// Queue a job without waiting.
    pub fn enqueue(&self, job: MigrationJob) -> EnqueueOutcome {
        let task_id = job.task_id;
        if !lock(&self.in_flight).insert(task_id) {
            tracing::debug!(task_id, "Migration already queued");
            return EnqueueOutcome::AlreadyQueued;
        }

        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(task_id, "Migration queued");
                EnqueueOutcome::Queued
            }
            Err(e) => {
                lock(&self.in_flight).remove(&task_id);
                tracing::error!(task_id, error = %e, "Failed to queue asset migration");
                EnqueueOutcome::Rejected
            }
        }
    }

    /// Whether a job for `task_id` is queued or running.
    pub fn is_in_flight(&self, task_id: DbId) -> bool {
        lock(&self.in_flight).contains(&task_id)
    }
}

fn lock(set: &InFlight) -> std::sync::MutexGuard<'_, HashSet<DbId>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct UploadWorker {
    store: Arc<dyn TaskStore>,
    storage: Arc<dyn ObjectStorage>,
    fetcher: Arc<dyn AssetFetcher>,
    key_prefix: String,
    in_flight: InFlight,
}

/// A copy of one file in owned storage.
struct StoredCopy {
    url: String,
    fingerprint: String,
    content_type: String,
}

impl UploadWorker {
    async fn run(
        self,
        mut rx: mpsc::Receiver<MigrationJob>,
        cancel: CancellationToken,
    ) -> UploaderReport {
        tracing::info!("Asset uploader started");
        let mut report = UploaderReport::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = rx.recv() => {
                    let Some(job) = job else { break };
                    let task_id = job.task_id;
                    match self.process(job).await {
                        JobOutcome::Migrated => report.migrated += 1,
                        JobOutcome::Stale => report.stale += 1,
                        JobOutcome::Failed => report.failed += 1,
                    }
                    lock(&self.in_flight).remove(&task_id);
                }
            }
        }

        // Leave dropped jobs visible to the sweeper rather than stuck on
        // provider URLs.
        rx.close();
        while let Ok(job) = rx.try_recv() {
            report.abandoned += 1;
            self.demote(&job, STATE_MIGRATION_ABANDONED, "Uploader stopped before migrating")
                .await;
            lock(&self.in_flight).remove(&job.task_id);
        }

        if report.abandoned > 0 {
            tracing::warn!(abandoned = report.abandoned, "Asset uploader abandoned queued jobs");
        }
        tracing::info!(?report, "Asset uploader stopped");
        report
    }

    async fn process(&self, job: MigrationJob) -> JobOutcome {
        // Skip work for results that have already been replaced.
        match self.store.find_by_id(job.task_id).await {
            Ok(Some(task)) if task.result_version == job.result_version => {}
            Ok(_) => {
                tracing::info!(task_id = job.task_id, "Result changed before migration; skipping");
                return JobOutcome::Stale;
            }
            Err(e) => {
                tracing::error!(task_id = job.task_id, error = %e, "Failed to load task for migration");
                return JobOutcome::Failed;
            }
        }

        let migrated = match self.migrate(&job).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task_id = job.task_id, error = %e, "Asset migration failed");
                self.demote(&job, STATE_MIGRATION_FAILED, &e.to_string()).await;
                return JobOutcome::Failed;
            }
        };

        let patch = GenerationTaskPatch {
            task_result: Some(migrated),
            ..Default::default()
        };
        match self
            .store
            .update_if_version(job.task_id, job.result_version, &patch)
            .await
        {
            Ok(Some(_)) => {
                tracing::info!(task_id = job.task_id, "Assets migrated to owned storage");
                JobOutcome::Migrated
            }
            Ok(None) => {
                tracing::warn!(
                    task_id = job.task_id,
                    version = job.result_version,
                    "Result replaced during migration; keeping newer data",
                );
                JobOutcome::Stale
            }
            Err(e) => {
                tracing::error!(task_id = job.task_id, error = %e, "Failed to store migrated result");
                JobOutcome::Failed
            }
        }
    }

    /// Copy every unmigrated asset and return the rewritten result.
    async fn migrate(&self, job: &MigrationJob) -> Result<TaskResult, StorageError> {
        let mut result = job.result.clone();

        for asset in result.assets.iter_mut().filter(|a| !a.is_migrated()) {
            let copy = self
                .copy_to_storage(&asset.url, asset.content_type.as_deref(), job.media_kind)
                .await?;
            asset.provider_url = Some(std::mem::replace(&mut asset.url, copy.url));
            asset.fingerprint = Some(copy.fingerprint);
            asset.content_type = Some(copy.content_type);

            let thumbnail = asset
                .thumbnail_url
                .clone()
                .filter(|_| asset.provider_thumbnail_url.is_none());
            if let Some(thumbnail) = thumbnail {
                match self.copy_to_storage(&thumbnail, None, MediaKind::Image).await {
                    Ok(copy) => {
                        asset.thumbnail_url = Some(copy.url);
                        asset.provider_thumbnail_url = Some(thumbnail);
                    }
                    Err(e) => {
                        tracing::warn!(task_id = job.task_id, error = %e, "Thumbnail migration failed; keeping provider URL");
                    }
                }
            }
        }

        result.pending_migration = false;
        Ok(result)
    }

    /// Download `url` and store it under its content fingerprint, reusing
    /// an existing object with the same fingerprint.
    async fn copy_to_storage(
        &self,
        url: &str,
        content_type_hint: Option<&str>,
        kind: MediaKind,
    ) -> Result<StoredCopy, StorageError> {
        let fetched = self.fetcher.fetch(url).await?;
        let fingerprint = sha256_hex(&fetched.bytes);
        let content_type = fetched
            .content_type
            .or_else(|| content_type_hint.map(String::from))
            .unwrap_or_else(|| default_content_type(kind).to_string());
        let extension = extension_for(Some(&content_type), url, kind);
        let key = object_key(&self.key_prefix, kind, &fingerprint, extension);

        let url = match self.storage.find_object(&key).await? {
            Some(existing) => {
                tracing::debug!(key = %key, "Object already stored; skipping upload");
                existing
            }
            None => {
                self.storage
                    .put_object(&key, fetched.bytes, &content_type)
                    .await?
            }
        };

        Ok(StoredCopy {
            url,
            fingerprint,
            content_type,
        })
    }

    /// Move a `success` task back to `processing`, only if its result has
    /// not been replaced since the job was queued.
    async fn demote(&self, job: &MigrationJob, state: &str, reason: &str) {
        let patch = GenerationTaskPatch {
            status: Some(TaskStatus::Processing),
            task_info: Some(TaskInfo::error(state, reason)),
            ..Default::default()
        };
        match self
            .store
            .update_if_version(job.task_id, job.result_version, &patch)
            .await
        {
            Ok(Some(_)) => {
                tracing::warn!(task_id = job.task_id, state, "Task demoted to processing");
            }
            Ok(None) => {
                tracing::info!(task_id = job.task_id, "Result replaced; demotion skipped");
            }
            Err(e) => {
                tracing::error!(task_id = job.task_id, error = %e, "Failed to demote task");
            }
        }
    }
}

fn default_content_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image/png",
        MediaKind::Video => "video/mp4",
        MediaKind::Music => "audio/mpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_content_types_match_extensions() {
        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Music] {
            let ct = default_content_type(kind);
            assert_eq!(
                extension_for(Some(ct), "https://x/no-extension", kind),
                extension_for(None, "https://x/no-extension", kind)
            );
        }
    }
}
