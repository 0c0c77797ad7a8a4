//! In-memory collaborators for pipeline behaviour tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{
    GenerationOptions, MediaAsset, MusicOptions, TaskInfo, TaskResult, VideoOptions,
};
use genflow_core::types::{Credits, DbId};
use genflow_db::models::credit::{
    ConsumeOutcome, CreditTransaction, KIND_CONSUME, KIND_GRANT, KIND_REFUND,
};
use genflow_db::models::generation_task::{
    CreateGenerationTask, GenerationTask, GenerationTaskFilter, GenerationTaskPatch, Page,
};
use genflow_db::models::notification::CreateNotification;
use genflow_pipeline::uploader::UploaderReport;
use genflow_pipeline::{
    AssetUploader, CreditLedger, NotificationSink, Notifier, QueryCoordinator,
    ReconciliationSweeper, SubmissionService, TaskStore, UploaderConfig,
};
use genflow_providers::{
    ProviderAdapter, ProviderError, ProviderQueryResponse, ProviderRegistry, SubmitRequest,
    SubmitResponse,
};
use genflow_storage::{AssetFetcher, FetchedAsset, ObjectStorage, StorageError};
use sqlx::types::Json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const PROVIDER: &str = "scripted";
pub const APP_URL: &str = "https://app.example.com";
pub const MEDIA_BASE: &str = "https://media.example.com";
pub const DAMPING: Duration = Duration::from_secs(10);

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

// ---------------------------------------------------------------------------
// Task store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<DbId, GenerationTask>>,
    next_id: AtomicI64,
    writes: AtomicUsize,
    /// Sweep order per task; higher means swept more recently.
    swept: Mutex<HashMap<DbId, i64>>,
    sweeps: AtomicI64,
    fail_creates: AtomicBool,
}

impl MemoryTaskStore {
    pub fn get(&self, id: DbId) -> GenerationTask {
        lock(&self.tasks).get(&id).cloned().expect("task exists")
    }

    /// Make every later `create` fail as if the pool were exhausted.
    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn task_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Number of successful update calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self, id: DbId, patch: &GenerationTaskPatch, expected: Option<i64>) -> Option<GenerationTask> {
        let mut tasks = lock(&self.tasks);
        let task = tasks.get_mut(&id)?;
        if expected.is_some_and(|v| v != task.result_version) {
            return None;
        }
        task.apply(patch);
        task.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Some(task.clone())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, input: &CreateGenerationTask) -> Result<GenerationTask, sqlx::Error> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let task = GenerationTask {
            id,
            user_id: input.user_id,
            media_kind: input.media_kind,
            provider: input.provider.clone(),
            model: input.model.clone(),
            scene: input.scene.clone(),
            prompt: input.prompt.clone(),
            options: Json(input.options.clone()),
            status: TaskStatus::Pending,
            external_job_id: None,
            task_info: None,
            task_result: None,
            result_version: 0,
            cost_credits: input.cost_credits,
            credit_transaction_id: input.credit_transaction_id,
            created_at: now,
            updated_at: now,
        };
        lock(&self.tasks).insert(id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<GenerationTask>, sqlx::Error> {
        Ok(lock(&self.tasks).get(&id).cloned())
    }

    async fn update_by_id(
        &self,
        id: DbId,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        Ok(self.write(id, patch, None))
    }

    async fn update_if_version(
        &self,
        id: DbId,
        expected_version: i64,
        patch: &GenerationTaskPatch,
    ) -> Result<Option<GenerationTask>, sqlx::Error> {
        Ok(self.write(id, patch, Some(expected_version)))
    }

    async fn list(
        &self,
        filter: &GenerationTaskFilter,
        page: Page,
    ) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let mut tasks: Vec<GenerationTask> = lock(&self.tasks)
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tasks
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count(&self, filter: &GenerationTaskFilter) -> Result<i64, sqlx::Error> {
        Ok(lock(&self.tasks).values().filter(|t| filter.matches(t)).count() as i64)
    }

    async fn list_in_progress(&self, limit: i64) -> Result<Vec<GenerationTask>, sqlx::Error> {
        let swept = lock(&self.swept).clone();
        let mut tasks: Vec<GenerationTask> = lock(&self.tasks)
            .values()
            .filter(|t| t.status.is_in_progress() && t.external_job_id.is_some())
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            swept
                .get(&a.id)
                .cmp(&swept.get(&b.id))
                .then(a.updated_at.cmp(&b.updated_at))
                .then(a.id.cmp(&b.id))
        });
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn count_unsubmitted_in_progress(&self) -> Result<i64, sqlx::Error> {
        Ok(lock(&self.tasks)
            .values()
            .filter(|t| t.status.is_in_progress() && t.external_job_id.is_none())
            .count() as i64)
    }

    async fn mark_swept(&self, ids: &[DbId]) -> Result<(), sqlx::Error> {
        let seq = self.sweeps.fetch_add(1, Ordering::SeqCst) + 1;
        let mut swept = lock(&self.swept);
        for id in ids {
            swept.insert(*id, seq);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Credit ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<CreditTransaction>>,
}

impl MemoryLedger {
    pub fn grant(&self, user_id: DbId, amount: Credits) {
        self.push(user_id, amount, KIND_GRANT, None);
    }

    pub fn refunds(&self) -> usize {
        lock(&self.entries).iter().filter(|e| e.kind == KIND_REFUND).count()
    }

    fn sum(&self, user_id: DbId) -> Credits {
        lock(&self.entries)
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.amount)
            .sum()
    }

    fn push(&self, user_id: DbId, amount: Credits, kind: &str, task_id: Option<DbId>) -> CreditTransaction {
        let mut entries = lock(&self.entries);
        let entry = CreditTransaction {
            id: entries.len() as DbId + 1,
            user_id,
            amount,
            kind: kind.to_string(),
            description: String::new(),
            task_id,
            created_at: Utc::now(),
        };
        entries.push(entry.clone());
        entry
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn balance(&self, user_id: DbId) -> Result<Credits, sqlx::Error> {
        Ok(self.sum(user_id))
    }

    async fn consume(
        &self,
        user_id: DbId,
        amount: Credits,
        _description: &str,
    ) -> Result<ConsumeOutcome, sqlx::Error> {
        let available = self.sum(user_id);
        if available < amount {
            return Ok(ConsumeOutcome::Insufficient { available });
        }
        Ok(ConsumeOutcome::Consumed(self.push(user_id, -amount, KIND_CONSUME, None)))
    }

    async fn refund(
        &self,
        user_id: DbId,
        amount: Credits,
        task_id: DbId,
        _description: &str,
    ) -> Result<Option<CreditTransaction>, sqlx::Error> {
        let already = lock(&self.entries)
            .iter()
            .any(|e| e.kind == KIND_REFUND && e.task_id == Some(task_id));
        if already {
            return Ok(None);
        }
        Ok(Some(self.push(user_id, amount, KIND_REFUND, Some(task_id))))
    }

    async fn reverse(
        &self,
        charge: &CreditTransaction,
        _description: &str,
    ) -> Result<CreditTransaction, sqlx::Error> {
        Ok(self.push(charge.user_id, -charge.amount, KIND_REFUND, None))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryNotifications {
    created: Mutex<Vec<CreateNotification>>,
}

impl MemoryNotifications {
    pub fn all(&self) -> Vec<CreateNotification> {
        lock(&self.created).clone()
    }

    pub fn for_task(&self, task_id: DbId) -> Vec<CreateNotification> {
        self.all()
            .into_iter()
            .filter(|n| n.source_task_id == Some(task_id))
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifications {
    async fn create(&self, input: &CreateNotification) -> Result<bool, sqlx::Error> {
        let mut created = lock(&self.created);
        let duplicate = created
            .iter()
            .any(|n| n.source_task_id == input.source_task_id && n.kind == input.kind);
        if duplicate {
            return Ok(false);
        }
        created.push(input.clone());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// What the scripted provider answers to `query`.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(ProviderQueryResponse),
    Transient,
    Reject,
}

pub struct ScriptedProvider {
    script: Mutex<Script>,
    /// Simulated latency of each query.
    latency: Mutex<Duration>,
    submit_fails: AtomicBool,
    queries: AtomicUsize,
    submits: AtomicUsize,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script::Respond(processing("queuing"))),
            latency: Mutex::new(Duration::ZERO),
            submit_fails: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
        }
    }
}

impl ScriptedProvider {
    pub fn set(&self, script: Script) {
        *lock(&self.script) = script;
    }

    pub fn respond(&self, response: ProviderQueryResponse) {
        self.set(Script::Respond(response));
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn fail_submits(&self) {
        self.submit_fails.store(true, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.submit_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::MissingJobId);
        }
        Ok(SubmitResponse {
            external_job_id: format!("job-{n}"),
            raw: serde_json::json!({ "taskId": format!("job-{n}") }),
        })
    }

    async fn query(
        &self,
        _external_job_id: &str,
        _media_kind: MediaKind,
        _model: &str,
    ) -> Result<ProviderQueryResponse, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let script = lock(&self.script).clone();
        match script {
            Script::Respond(response) => Ok(response),
            Script::Transient => Err(ProviderError::Transient("connection reset by peer".into())),
            Script::Reject => Err(ProviderError::Api {
                status: 400,
                body: "job id unknown".into(),
            }),
        }
    }
}

pub fn processing(state: &str) -> ProviderQueryResponse {
    ProviderQueryResponse {
        status: TaskStatus::Processing,
        info: Some(TaskInfo {
            state: state.into(),
            ..Default::default()
        }),
        result: None,
    }
}

/// A `success` answer whose media is still on the provider.
pub fn hosted_success(kind: MediaKind, url: &str) -> ProviderQueryResponse {
    let mut result = TaskResult::new(kind, vec![MediaAsset::remote(url)]);
    result.pending_migration = true;
    ProviderQueryResponse {
        status: TaskStatus::Success,
        info: Some(TaskInfo {
            state: "success".into(),
            ..Default::default()
        }),
        result: Some(result),
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemoryStorage {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        lock(&self.objects).insert(key.to_string(), bytes);
        Ok(self.public_url(key))
    }

    async fn find_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.objects)
            .contains_key(key)
            .then(|| self.public_url(key)))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{MEDIA_BASE}/{key}")
    }
}

/// Serves fixed bytes per URL; unknown URLs fail.
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn serve(&self, url: &str, bytes: &[u8]) {
        lock(&self.files).insert(url.to_string(), bytes.to_vec());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, StorageError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = lock(&self.files).get(url).cloned().ok_or_else(|| StorageError::Fetch {
            url: url.to_string(),
            message: "HTTP 404 Not Found".into(),
        })?;
        Ok(FetchedAsset {
            bytes,
            content_type: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryTaskStore>,
    pub ledger: Arc<MemoryLedger>,
    pub notifications: Arc<MemoryNotifications>,
    pub provider: Arc<ScriptedProvider>,
    pub storage: Arc<MemoryStorage>,
    pub fetcher: Arc<MemoryFetcher>,
    pub uploader: AssetUploader,
    pub coordinator: QueryCoordinator,
    pub submission: SubmissionService,
    pub cancel: CancellationToken,
    pub uploader_handle: JoinHandle<UploaderReport>,
}

impl Harness {
    /// Wire every component over in-memory collaborators. Must run inside
    /// a tokio runtime.
    pub fn new() -> Self {
        Self::with_queue_capacity(16)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        let store = Arc::new(MemoryTaskStore::default());
        let ledger = Arc::new(MemoryLedger::default());
        let notifications = Arc::new(MemoryNotifications::default());
        let provider = Arc::new(ScriptedProvider::default());
        let storage = Arc::new(MemoryStorage::default());
        let fetcher = Arc::new(MemoryFetcher::default());
        let cancel = CancellationToken::new();

        let mut providers = ProviderRegistry::new();
        providers.register(provider.clone());

        let (uploader, uploader_handle) = AssetUploader::spawn(
            UploaderConfig {
                queue_capacity,
                key_prefix: "generations".into(),
            },
            store.clone(),
            storage.clone(),
            fetcher.clone(),
            cancel.clone(),
        );

        let coordinator = QueryCoordinator::new(
            store.clone(),
            providers.clone(),
            uploader.clone(),
            Notifier::new(notifications.clone(), APP_URL),
            DAMPING,
        );
        let submission = SubmissionService::new(store.clone(), ledger.clone(), providers);

        Self {
            store,
            ledger,
            notifications,
            provider,
            storage,
            fetcher,
            uploader,
            coordinator,
            submission,
            cancel,
            uploader_handle,
        }
    }

    pub fn sweeper(&self, batch_limit: i64) -> ReconciliationSweeper {
        ReconciliationSweeper::new(self.store.clone(), self.coordinator.clone(), batch_limit)
    }

    /// Insert a task that has already been accepted by the provider.
    pub async fn seed_task(&self, user_id: DbId, kind: MediaKind) -> GenerationTask {
        let task = self.seed_unsubmitted(user_id, kind).await;
        let patch = GenerationTaskPatch {
            external_job_id: Some(format!("ext-{}", task.id)),
            ..Default::default()
        };
        self.store.update_by_id(task.id, &patch).await.unwrap().unwrap()
    }

    /// Insert a task whose submission never completed.
    pub async fn seed_unsubmitted(&self, user_id: DbId, kind: MediaKind) -> GenerationTask {
        let options = match kind {
            MediaKind::Music => GenerationOptions::Music(MusicOptions::default()),
            _ => GenerationOptions::Video(VideoOptions::default()),
        };
        self.store
            .create(&CreateGenerationTask {
                user_id,
                media_kind: kind,
                provider: PROVIDER.into(),
                model: "model-x".into(),
                scene: "text-to-video".into(),
                prompt: "a lighthouse in a storm at night, waves crashing over the rocks".into(),
                options,
                cost_credits: 1,
                credit_transaction_id: None,
            })
            .await
            .unwrap()
    }

    /// Let background work run until `done` holds, advancing paused time.
    pub async fn wait_until(&self, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..200 {
            if done(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }
}
