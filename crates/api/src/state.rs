use std::sync::Arc;

use genflow_pipeline::uploader::UploaderReport;
use genflow_pipeline::{
    AssetUploader, CreditLedger, NotificationSink, Notifier, PgCreditLedger, PgNotificationSink,
    PgTaskStore, QueryCoordinator, ReconciliationSweeper, SubmissionService, TaskStore,
    UploaderConfig,
};
use genflow_providers::ProviderRegistry;
use genflow_storage::{AssetFetcher, ObjectStorage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: sqlx::PgPool,
    /// Server configuration (wrapped in Arc for cheap cloning).
    pub config: Arc<ServerConfig>,
    /// Creates tasks and hands them to providers.
    pub submission: Arc<SubmissionService>,
    /// Single entry point for provider status queries.
    pub coordinator: QueryCoordinator,
    /// Drives unfinished tasks through the coordinator.
    pub sweeper: Arc<ReconciliationSweeper>,
}

impl AppState {
    /// Wire the pipeline over `pool` and start the asset uploader worker.
    ///
    /// The uploader runs until `cancel` fires; its handle yields the final
    /// [`UploaderReport`].
    pub fn build(
        pool: sqlx::PgPool,
        config: ServerConfig,
        providers: ProviderRegistry,
        storage: Arc<dyn ObjectStorage>,
        fetcher: Arc<dyn AssetFetcher>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<UploaderReport>) {
        let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool.clone()));
        let ledger: Arc<dyn CreditLedger> = Arc::new(PgCreditLedger::new(pool.clone()));
        let sink: Arc<dyn NotificationSink> = Arc::new(PgNotificationSink::new(pool.clone()));

        let (uploader, uploader_handle) = AssetUploader::spawn(
            UploaderConfig {
                queue_capacity: config.upload_queue_capacity,
                key_prefix: config.storage.prefix.clone(),
            },
            Arc::clone(&store),
            storage,
            fetcher,
            cancel,
        );

        let coordinator = QueryCoordinator::new(
            Arc::clone(&store),
            providers.clone(),
            uploader,
            Notifier::new(sink, config.app_url.clone()),
            config.poll_damping,
        );
        let submission = SubmissionService::new(Arc::clone(&store), ledger, providers);
        let sweeper =
            ReconciliationSweeper::new(store, coordinator.clone(), config.sweep_batch_limit);

        let state = Self {
            pool,
            config: Arc::new(config),
            submission: Arc::new(submission),
            coordinator,
            sweeper: Arc::new(sweeper),
        };
        (state, uploader_handle)
    }
}
