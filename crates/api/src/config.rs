use std::time::Duration;

use genflow_pipeline::coordinator::DEFAULT_POLL_DAMPING;
use genflow_pipeline::sweeper::DEFAULT_BATCH_LIMIT;
use genflow_pipeline::uploader::DEFAULT_QUEUE_CAPACITY;
use genflow_storage::StorageConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except
/// `JWT_SECRET`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds. Must exceed the poll damping.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background workers.
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration.
    pub jwt: JwtConfig,
    /// Delay applied to user polls that observe an unfinished task.
    pub poll_damping: Duration,
    /// Bearer token required by the sweep endpoint. Open when unset.
    pub sweep_secret: Option<String>,
    /// Maximum tasks examined per sweep.
    pub sweep_batch_limit: i64,
    /// When set, the server sweeps on this interval by itself.
    pub sweep_interval: Option<Duration>,
    /// Frontend base URL used in notification deep links.
    pub app_url: String,
    /// Capacity of the asset migration queue.
    pub upload_queue_capacity: usize,
    /// Timeout for downloading one provider-hosted asset.
    pub asset_fetch_timeout: Duration,
    /// Owned object storage.
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `60`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `POLL_DAMPING_SECS`        | `10`                    |
    /// | `SWEEP_SECRET`             | unset                   |
    /// | `SWEEP_BATCH_LIMIT`        | `50`                    |
    /// | `SWEEP_INTERVAL_SECS`      | unset                   |
    /// | `APP_URL`                  | `http://localhost:5173` |
    /// | `UPLOAD_QUEUE_CAPACITY`    | `256`                   |
    /// | `ASSET_FETCH_TIMEOUT_SECS` | `300`                   |
    ///
    /// JWT settings come from [`JwtConfig::from_env`] and storage settings
    /// from [`StorageConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let poll_damping = std::env::var("POLL_DAMPING_SECS")
            .ok()
            .map(|v| {
                Duration::from_secs(v.parse().expect("POLL_DAMPING_SECS must be a valid u64"))
            })
            .unwrap_or(DEFAULT_POLL_DAMPING);

        let sweep_secret = std::env::var("SWEEP_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let sweep_batch_limit: i64 = std::env::var("SWEEP_BATCH_LIMIT")
            .ok()
            .map(|v| v.parse().expect("SWEEP_BATCH_LIMIT must be a valid i64"))
            .unwrap_or(DEFAULT_BATCH_LIMIT);

        let sweep_interval = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| {
                let secs: u64 = v.parse().expect("SWEEP_INTERVAL_SECS must be a valid u64");
                assert!(secs > 0, "SWEEP_INTERVAL_SECS must be positive");
                Duration::from_secs(secs)
            });

        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:5173".into());

        let upload_queue_capacity: usize = std::env::var("UPLOAD_QUEUE_CAPACITY")
            .ok()
            .map(|v| v.parse().expect("UPLOAD_QUEUE_CAPACITY must be a valid usize"))
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);

        let asset_fetch_timeout = Duration::from_secs(
            std::env::var("ASSET_FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .expect("ASSET_FETCH_TIMEOUT_SECS must be a valid u64"),
        );

        if Duration::from_secs(request_timeout_secs) <= poll_damping {
            tracing::warn!(
                request_timeout_secs,
                poll_damping_secs = poll_damping.as_secs(),
                "REQUEST_TIMEOUT_SECS does not exceed the poll damping; damped polls will time out"
            );
        }

        let jwt = JwtConfig::from_env();
        let storage = StorageConfig::from_env()
            .unwrap_or_else(|e| panic!("Invalid storage configuration: {e}"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            poll_damping,
            sweep_secret,
            sweep_batch_limit,
            sweep_interval,
            app_url,
            upload_queue_capacity,
            asset_fetch_timeout,
            storage,
        }
    }
}
