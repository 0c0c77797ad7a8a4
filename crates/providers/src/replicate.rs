//! Replicate adapter.
//!
//! Official models are started with `POST /v1/models/{owner}/{name}/predictions`;
//! a model pinned to a version (`owner/name:version`) goes through
//! `POST /v1/predictions`. Status comes from `GET /v1/predictions/{id}`.

use std::time::Duration;

use async_trait::async_trait;
use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{GenerationOptions, MediaAsset, TaskInfo, TaskResult};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::adapter::{ProviderAdapter, ProviderQueryResponse, SubmitRequest, SubmitResponse};
use crate::error::ProviderError;
use crate::http::{timeout_from_env, ProviderHttp};

/// Registry name.
pub const PROVIDER_NAME: &str = "replicate";

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Connection settings for Replicate.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ReplicateConfig {
    /// Load from `REPLICATE_API_TOKEN`, `REPLICATE_BASE_URL` and
    /// `PROVIDER_TIMEOUT_SECS`. Returns `None` when no token is set.
    pub fn from_env() -> Option<Self> {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())?;
        Some(Self {
            api_token,
            base_url: std::env::var("REPLICATE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            timeout: timeout_from_env("PROVIDER_TIMEOUT_SECS"),
        })
    }
}

/// Subset of a Replicate prediction object.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub logs: Option<String>,
}

/// Replicate provider.
pub struct ReplicateProvider {
    http: ProviderHttp,
}

impl ReplicateProvider {
    pub fn new(config: &ReplicateConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderHttp::new(&config.base_url, &config.api_token, config.timeout)?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        let input = build_input(request);
        let raw: Value = match request.model.split_once(':') {
            Some((_, version)) => {
                let body = json!({ "version": version, "input": input });
                self.http.post_json("/v1/predictions", &body).await?
            }
            None => {
                let path = format!("/v1/models/{}/predictions", request.model);
                self.http.post_json(&path, &json!({ "input": input })).await?
            }
        };

        let external_job_id = raw
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(ProviderError::MissingJobId)?
            .to_string();

        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            external_job_id = %external_job_id,
            "Replicate prediction created",
        );

        Ok(SubmitResponse {
            external_job_id,
            raw,
        })
    }

    async fn query(
        &self,
        external_job_id: &str,
        media_kind: MediaKind,
        _model: &str,
    ) -> Result<ProviderQueryResponse, ProviderError> {
        let path = format!("/v1/predictions/{external_job_id}");
        let raw: Value = self.http.get_json(&path, &[]).await?;
        normalize_prediction(media_kind, raw)
    }
}

/// Model input built from the prompt and typed options.
pub fn build_input(request: &SubmitRequest) -> Value {
    let mut input = serde_json::Map::new();
    input.insert("prompt".into(), json!(request.prompt));

    match &request.options {
        GenerationOptions::Image(o) => {
            if let Some(v) = &o.aspect_ratio {
                input.insert("aspect_ratio".into(), json!(v));
            }
            if let Some(v) = &o.resolution {
                input.insert("resolution".into(), json!(v));
            }
            if let Some(v) = o.num_images {
                input.insert("num_outputs".into(), json!(v));
            }
        }
        GenerationOptions::Video(o) => {
            if let Some(v) = &o.aspect_ratio {
                input.insert("aspect_ratio".into(), json!(v));
            }
            if let Some(v) = &o.resolution {
                input.insert("resolution".into(), json!(v));
            }
            if let Some(v) = o.duration_secs {
                input.insert("duration".into(), json!(v));
            }
        }
        GenerationOptions::Music(o) => {
            if let Some(v) = &o.lyrics {
                input.insert("lyrics".into(), json!(v));
            }
            if let Some(v) = &o.style {
                input.insert("style".into(), json!(v));
            }
        }
    }

    match request.options.image_urls() {
        [] => {}
        [single] => {
            input.insert("image".into(), json!(single));
        }
        many => {
            input.insert("image_input".into(), json!(many));
        }
    }
    for (k, v) in request.options.extra() {
        input.insert(k.clone(), v.clone());
    }
    Value::Object(input)
}

/// Normalize a prediction object.
pub fn normalize_prediction(
    kind: MediaKind,
    raw: Value,
) -> Result<ProviderQueryResponse, ProviderError> {
    let prediction: Prediction = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::InvalidResponse(format!("Bad Replicate prediction: {e}")))?;

    let status = match prediction.status.as_str() {
        "starting" => TaskStatus::Pending,
        "processing" => TaskStatus::Processing,
        "succeeded" => TaskStatus::Success,
        "failed" | "canceled" => TaskStatus::Failed,
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "Unknown Replicate status '{other}'"
            )))
        }
    };

    let error_message = match &prediction.error {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let error_message = error_message.or_else(|| {
        (prediction.status == "canceled").then(|| "Prediction was canceled".to_string())
    });

    let result = if status == TaskStatus::Success {
        let urls = output_urls(&prediction.output);
        if urls.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Replicate prediction succeeded without output".into(),
            ));
        }
        let mut result = TaskResult::new(kind, urls.into_iter().map(MediaAsset::remote).collect());
        // Replicate removes prediction outputs after an hour.
        result.pending_migration = true;
        result.metadata = json!({ "provider": PROVIDER_NAME });
        Some(result)
    } else {
        None
    };

    Ok(ProviderQueryResponse {
        status,
        info: Some(TaskInfo {
            state: prediction.status,
            progress: None,
            error_message,
            raw,
        }),
        result,
    })
}

/// `output` is a URL, a list of URLs, or an object with a `url` field.
fn output_urls(output: &Value) -> Vec<String> {
    match output {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(output_urls).collect(),
        Value::Object(map) => map
            .get("url")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
