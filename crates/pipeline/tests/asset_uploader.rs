//! Background Asset Uploader: URL rewrite, fingerprint dedupe, version
//! checks, demotion and shutdown.

mod common;

use common::{hosted_success, Harness, MEDIA_BASE};
use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{MediaAsset, TaskResult};
use genflow_db::models::generation_task::GenerationTaskPatch;
use genflow_pipeline::uploader::{
    EnqueueOutcome, STATE_MIGRATION_ABANDONED, STATE_MIGRATION_FAILED,
};
use genflow_pipeline::{Caller, MigrationJob, TaskStore};

const PROVIDER_URL: &str = "https://tempfile.provider.example/v.mp4";

/// Put a task into `success` with a provider-hosted result, bypassing the
/// coordinator, and return the job the coordinator would have queued.
async fn succeeded_task(h: &Harness, url: &str) -> MigrationJob {
    let task = h.seed_task(1, MediaKind::Video).await;
    let mut result = TaskResult::new(MediaKind::Video, vec![MediaAsset::remote(url)]);
    result.pending_migration = true;
    let patch = GenerationTaskPatch {
        status: Some(TaskStatus::Success),
        task_result: Some(result.clone()),
        ..Default::default()
    };
    let task = h.store.update_by_id(task.id, &patch).await.unwrap().unwrap();
    MigrationJob {
        task_id: task.id,
        media_kind: task.media_kind,
        result_version: task.result_version,
        result,
    }
}

#[tokio::test(start_paused = true)]
async fn migration_rewrites_urls_and_keeps_provider_fallback() {
    let h = Harness::new();
    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let job = succeeded_task(&h, PROVIDER_URL).await;
    let task_id = job.task_id;

    assert_eq!(h.uploader.enqueue(job), EnqueueOutcome::Queued);
    h.wait_until(|h| !h.uploader.is_in_flight(task_id)).await;

    let task = h.store.get(task_id);
    assert_eq!(task.status, TaskStatus::Success);
    let result = task.result().unwrap();
    assert!(!result.pending_migration);
    let asset = &result.assets[0];
    assert!(asset.url.starts_with(MEDIA_BASE));
    assert!(asset.url.ends_with(".mp4"));
    assert_eq!(asset.provider_url.as_deref(), Some(PROVIDER_URL));
    assert_eq!(asset.content_type.as_deref(), Some("video/mp4"));
    assert_eq!(
        asset.fingerprint.as_deref(),
        Some(genflow_core::hashing::sha256_hex(b"video-bytes").as_str())
    );
    assert_eq!(h.storage.puts(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_enqueue_while_in_flight_is_dropped() {
    let h = Harness::new();
    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let job = succeeded_task(&h, PROVIDER_URL).await;

    assert_eq!(h.uploader.enqueue(job.clone()), EnqueueOutcome::Queued);
    assert_eq!(h.uploader.enqueue(job.clone()), EnqueueOutcome::AlreadyQueued);

    h.wait_until(|h| !h.uploader.is_in_flight(job.task_id)).await;
    assert_eq!(h.storage.puts(), 1);
}

#[tokio::test(start_paused = true)]
async fn running_the_same_job_twice_stores_the_asset_once() {
    let h = Harness::new();
    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let job = succeeded_task(&h, PROVIDER_URL).await;

    h.uploader.enqueue(job.clone());
    h.wait_until(|h| !h.uploader.is_in_flight(job.task_id)).await;
    let after_first = h.store.get(job.task_id);

    // Same job again: its version is stale now.
    h.uploader.enqueue(job.clone());
    h.wait_until(|h| !h.uploader.is_in_flight(job.task_id)).await;

    assert_eq!(h.storage.object_count(), 1);
    assert_eq!(h.storage.puts(), 1);
    assert_eq!(h.store.get(job.task_id), after_first);
}

#[tokio::test(start_paused = true)]
async fn identical_content_from_two_tasks_is_uploaded_once() {
    let h = Harness::new();
    h.fetcher.serve("https://tempfile.provider.example/a.mp4", b"same");
    h.fetcher.serve("https://tempfile.provider.example/b.mp4", b"same");
    let a = succeeded_task(&h, "https://tempfile.provider.example/a.mp4").await;
    let b = succeeded_task(&h, "https://tempfile.provider.example/b.mp4").await;

    h.uploader.enqueue(a.clone());
    h.uploader.enqueue(b.clone());
    h.wait_until(|h| !h.uploader.is_in_flight(a.task_id) && !h.uploader.is_in_flight(b.task_id))
        .await;

    assert_eq!(h.storage.puts(), 1);
    let url_a = h.store.get(a.task_id).result().unwrap().assets[0].url.clone();
    let url_b = h.store.get(b.task_id).result().unwrap().assets[0].url.clone();
    assert_eq!(url_a, url_b);
}

#[tokio::test(start_paused = true)]
async fn failed_migration_demotes_to_processing() {
    let h = Harness::new();
    // Nothing served: the download fails.
    let job = succeeded_task(&h, PROVIDER_URL).await;

    h.uploader.enqueue(job.clone());
    h.wait_until(|h| !h.uploader.is_in_flight(job.task_id)).await;

    let task = h.store.get(job.task_id);
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.info().unwrap().state, STATE_MIGRATION_FAILED);
    // The provider result is kept for the next attempt.
    assert_eq!(task.result().unwrap().assets[0].url, PROVIDER_URL);
    assert_eq!(h.storage.puts(), 0);
}

#[tokio::test(start_paused = true)]
async fn demoted_task_is_migrated_on_the_next_poll() {
    let h = Harness::new();
    let task = h.seed_task(1, MediaKind::Video).await;
    h.provider.respond(hosted_success(MediaKind::Video, PROVIDER_URL));

    // First attempt: the provider file is not reachable yet.
    h.coordinator.query(task.id, Caller::System).await.unwrap();
    h.wait_until(|h| h.store.get(task.id).status == TaskStatus::Processing)
        .await;

    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let returned = h.coordinator.query(task.id, Caller::System).await.unwrap();
    assert_eq!(returned.status, TaskStatus::Success);
    h.wait_until(|h| {
        h.store
            .get(task.id)
            .result()
            .is_some_and(|r| !r.pending_migration)
    })
    .await;

    assert_eq!(h.store.get(task.id).status, TaskStatus::Success);
    assert_eq!(h.notifications.for_task(task.id).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn newer_result_wins_over_a_stale_migration() {
    let h = Harness::new();
    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let job = succeeded_task(&h, PROVIDER_URL).await;

    // A newer result lands before the worker gets to the job.
    let newer = TaskResult::new(
        MediaKind::Video,
        vec![MediaAsset::remote("https://media.example.com/already-owned.mp4")],
    );
    let patch = GenerationTaskPatch {
        task_result: Some(newer.clone()),
        ..Default::default()
    };
    h.store.update_by_id(job.task_id, &patch).await.unwrap();

    h.uploader.enqueue(job.clone());
    h.wait_until(|h| !h.uploader.is_in_flight(job.task_id)).await;

    let task = h.store.get(job.task_id);
    assert_eq!(task.result(), Some(&newer));
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(h.fetcher.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_and_demotes_queued_jobs() {
    let h = Harness::new();
    h.fetcher.serve(PROVIDER_URL, b"video-bytes");
    let job = succeeded_task(&h, PROVIDER_URL).await;

    // Cancel before the worker has had a chance to run.
    h.cancel.cancel();
    assert_eq!(h.uploader.enqueue(job.clone()), EnqueueOutcome::Queued);

    let report = h.uploader_handle.await.unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.migrated, 0);

    let task = h.store.get(job.task_id);
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.info().unwrap().state, STATE_MIGRATION_ABANDONED);
}

#[tokio::test(start_paused = true)]
async fn enqueue_after_worker_stopped_is_rejected() {
    let h = Harness::new();
    h.cancel.cancel();
    let uploader = h.uploader.clone();
    h.uploader_handle.await.unwrap();

    let job = MigrationJob {
        task_id: 99,
        media_kind: MediaKind::Image,
        result_version: 1,
        result: TaskResult::new(MediaKind::Image, vec![]),
    };
    assert_eq!(uploader.enqueue(job), EnqueueOutcome::Rejected);
    assert!(!uploader.is_in_flight(99));
}
