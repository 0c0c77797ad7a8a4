//! Shared setup for API integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use genflow_api::auth::jwt::JwtConfig;
use genflow_api::config::ServerConfig;
use genflow_api::routes;
use genflow_api::state::AppState;
use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{GenerationOptions, MediaAsset, TaskResult, VideoOptions};
use genflow_core::types::DbId;
use genflow_db::models::generation_task::{CreateGenerationTask, GenerationTask, GenerationTaskPatch};
use genflow_db::repositories::GenerationTaskRepo;
use genflow_providers::{
    ProviderAdapter, ProviderError, ProviderQueryResponse, ProviderRegistry, SubmitRequest,
    SubmitResponse,
};
use genflow_storage::config::StorageBackend;
use genflow_storage::{HttpAssetFetcher, LocalStorage, StorageConfig};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub const PROVIDER: &str = "stub";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SWEEP_SECRET: &str = "test-sweep-secret";

// ---------------------------------------------------------------------------
// Provider double
// ---------------------------------------------------------------------------

/// Accepts every submission (unless told otherwise) and answers queries
/// with whatever response was last set. With no response set, queries fail
/// transiently.
#[derive(Default)]
pub struct StubProvider {
    submitted: AtomicU64,
    queries: AtomicU64,
    reject_submits: AtomicBool,
    response: Mutex<Option<ProviderQueryResponse>>,
    latency: Mutex<Duration>,
}

impl StubProvider {
    pub fn respond(&self, status: TaskStatus, result: Option<TaskResult>) {
        *self.response.lock().unwrap() = Some(ProviderQueryResponse {
            status,
            info: None,
            result,
        });
    }

    pub fn reject_submits(&self) {
        self.reject_submits.store(true, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, _request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        if self.reject_submits.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 422,
                body: "prompt rejected by moderation".into(),
            });
        }
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SubmitResponse {
            external_job_id: format!("{PROVIDER}-{n}"),
            raw: serde_json::json!({ "taskId": format!("{PROVIDER}-{n}") }),
        })
    }

    async fn query(
        &self,
        _external_job_id: &str,
        _media_kind: MediaKind,
        _model: &str,
    ) -> Result<ProviderQueryResponse, ProviderError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let response = self.response.lock().unwrap().clone();
        response.ok_or_else(|| ProviderError::Transient("connection reset".into()))
    }
}

/// A finished video already hosted on owned storage, so no migration runs.
pub fn hosted_video(url: &str) -> TaskResult {
    TaskResult::new(
        MediaKind::Video,
        vec![MediaAsset {
            url: url.to_string(),
            provider_url: Some("https://provider.example.com/out.mp4".to_string()),
            ..MediaAsset::default()
        }],
    )
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

fn storage_dir() -> PathBuf {
    std::env::temp_dir().join(format!("genflow-api-test-{}", uuid::Uuid::new_v4()))
}

/// Build a test `ServerConfig` with safe defaults and no poll damping.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        poll_damping: Duration::ZERO,
        sweep_secret: None,
        sweep_batch_limit: 50,
        sweep_interval: None,
        app_url: "https://app.example.com".to_string(),
        upload_queue_capacity: 16,
        asset_fetch_timeout: Duration::from_secs(5),
        storage: StorageConfig {
            backend: StorageBackend::Local {
                dir: storage_dir(),
                public_url: "http://localhost:3000/files".to_string(),
            },
            prefix: "generations".to_string(),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<StubProvider>,
    pub cancel: CancellationToken,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the application router with the production middleware stack over
/// `pool` and a [`StubProvider`].
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with(pool, |_| {})
}

pub fn build_test_app_with(pool: PgPool, configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let mut config = test_config();
    configure(&mut config);

    let provider = Arc::new(StubProvider::default());
    let mut providers = ProviderRegistry::new();
    providers.register(provider.clone());

    let (dir, public_url) = match &config.storage.backend {
        StorageBackend::Local { dir, public_url } => (dir.clone(), public_url.clone()),
        StorageBackend::S3 { .. } => unreachable!("tests use local storage"),
    };
    let storage = Arc::new(LocalStorage::new(dir, public_url));
    let fetcher = Arc::new(HttpAssetFetcher::new(config.asset_fetch_timeout).unwrap());

    let cancel = CancellationToken::new();
    let (state, _uploader) = AppState::build(
        pool,
        config.clone(),
        providers,
        storage,
        fetcher,
        cancel.clone(),
    );

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state.clone());

    TestApp {
        router,
        state,
        provider,
        cancel,
    }
}

/// Bearer token for `user_id` signed with the test secret, shaped like the
/// ones the user service issues.
pub fn token_for(user_id: DbId) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({ "sub": user_id, "iat": now, "exp": now + 900 });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn video_request_json(provider: &str) -> serde_json::Value {
    serde_json::json!({
        "media_kind": "video",
        "provider": provider,
        "model": "veo3_fast",
        "scene": "text-to-video",
        "prompt": "a fox running through snow",
        "options": { "kind": "video", "aspect_ratio": "16:9" }
    })
}

/// Insert a task directly, optionally already accepted by the provider.
pub async fn seed_task(
    pool: &PgPool,
    user_id: DbId,
    media_kind: MediaKind,
    external_job_id: Option<&str>,
) -> GenerationTask {
    let options = match media_kind {
        MediaKind::Video => GenerationOptions::Video(VideoOptions::default()),
        MediaKind::Image => GenerationOptions::Image(Default::default()),
        MediaKind::Music => GenerationOptions::Music(Default::default()),
    };
    let task = GenerationTaskRepo::create(
        pool,
        &CreateGenerationTask {
            user_id,
            media_kind,
            provider: PROVIDER.to_string(),
            model: "test-model".to_string(),
            scene: "text-to-video".to_string(),
            prompt: "seeded".to_string(),
            options,
            cost_credits: 1,
            credit_transaction_id: None,
        },
    )
    .await
    .unwrap();

    match external_job_id {
        Some(job_id) => GenerationTaskRepo::update_by_id(
            pool,
            task.id,
            &GenerationTaskPatch {
                external_job_id: Some(job_id.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap(),
        None => task,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::get(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
