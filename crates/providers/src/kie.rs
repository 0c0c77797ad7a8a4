//! Kie.ai adapter.
//!
//! Images and videos go through the unified jobs API
//! (`/api/v1/jobs/createTask`, `/api/v1/jobs/recordInfo`); music goes
//! through the Suno endpoints (`/api/v1/generate`,
//! `/api/v1/generate/record-info`). Every response is wrapped in a
//! `{ code, msg, data }` envelope where `code == 200` means success.
//!
//! Kie deletes generated files after a retention window, so every result
//! is flagged for migration to owned storage.

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
pub const PROVIDER_NAME: &str = "kie";

const DEFAULT_BASE_URL: &str = "https://api.kie.ai";

const JOBS_CREATE_PATH: &str = "/api/v1/jobs/createTask";
const JOBS_RECORD_PATH: &str = "/api/v1/jobs/recordInfo";
const MUSIC_CREATE_PATH: &str = "/api/v1/generate";
const MUSIC_RECORD_PATH: &str = "/api/v1/generate/record-info";

/// Connection settings for Kie.
#[derive(Debug, Clone)]
pub struct KieConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Webhook Kie calls on completion. Polling works without it, but the
    /// music endpoint requires one to be present.
    pub callback_url: Option<String>,
}

impl KieConfig {
    /// Load from `KIE_API_KEY`, `KIE_BASE_URL`, `KIE_CALLBACK_URL` and
    /// `PROVIDER_TIMEOUT_SECS`. Returns `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("KIE_API_KEY").ok().filter(|k| !k.is_empty())?;
        Some(Self {
            api_key,
            base_url: std::env::var("KIE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            timeout: timeout_from_env("PROVIDER_TIMEOUT_SECS"),
            callback_url: std::env::var("KIE_CALLBACK_URL").ok().filter(|u| !u.is_empty()),
        })
    }
}

/// `{ code, msg, data }` wrapper around every Kie response.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    /// Unwrap `data`, mapping a non-200 `code` to an API error.
    fn into_data(self) -> Result<Value, ProviderError> {
        if self.code != 200 {
            let status = u16::try_from(self.code).unwrap_or(500);
            return Err(ProviderError::from_status(
                status,
                self.msg.unwrap_or_else(|| "no message".into()),
            ));
        }
        Ok(self.data)
    }
}

/// Kie.ai provider.
pub struct KieProvider {
    http: ProviderHttp,
    callback_url: Option<String>,
}

impl KieProvider {
    pub fn new(config: &KieConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: ProviderHttp::new(&config.base_url, &config.api_key, config.timeout)?,
            callback_url: config.callback_url.clone(),
        })
    }
}

#[async_trait]
impl ProviderAdapter for KieProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        let (path, body) = match request.media_kind {
            MediaKind::Image | MediaKind::Video => (
                JOBS_CREATE_PATH,
                build_job_body(request, self.callback_url.as_deref()),
            ),
            MediaKind::Music => (
                MUSIC_CREATE_PATH,
                build_music_body(request, self.callback_url.as_deref())?,
            ),
        };

        let envelope: Envelope = self.http.post_json(path, &body).await?;
        let data = envelope.into_data()?;
        let external_job_id = data
            .get("taskId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(ProviderError::MissingJobId)?
            .to_string();

        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            external_job_id = %external_job_id,
            "Kie job created",
        );

        Ok(SubmitResponse {
            external_job_id,
            raw: data,
        })
    }

    async fn query(
        &self,
        external_job_id: &str,
        media_kind: MediaKind,
        _model: &str,
    ) -> Result<ProviderQueryResponse, ProviderError> {
        let params = [("taskId", external_job_id)];
        match media_kind {
            MediaKind::Image | MediaKind::Video => {
                let envelope: Envelope = self.http.get_json(JOBS_RECORD_PATH, &params).await?;
                normalize_job_record(media_kind, &envelope.into_data()?)
            }
            MediaKind::Music => {
                let envelope: Envelope = self.http.get_json(MUSIC_RECORD_PATH, &params).await?;
                normalize_music_record(&envelope.into_data()?)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for `createTask` (image and video).
pub fn build_job_body(request: &SubmitRequest, callback_url: Option<&str>) -> Value {
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
                input.insert("num_images".into(), json!(v));
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
                input.insert("duration".into(), json!(v.to_string()));
            }
        }
        GenerationOptions::Music(_) => {}
    }

    let images = request.options.image_urls();
    if !images.is_empty() {
        input.insert("image_urls".into(), json!(images));
    }
    for (k, v) in request.options.extra() {
        input.insert(k.clone(), v.clone());
    }

    let mut body = json!({
        "model": request.model,
        "input": Value::Object(input),
    });
    if let Some(url) = callback_url {
        body["callBackUrl"] = json!(url);
    }
    body
}

/// Body for the Suno `generate` endpoint.
pub fn build_music_body(
    request: &SubmitRequest,
    callback_url: Option<&str>,
) -> Result<Value, ProviderError> {
    let GenerationOptions::Music(o) = &request.options else {
        return Err(ProviderError::Unsupported {
            provider: PROVIDER_NAME.into(),
            kind: request.options.media_kind(),
        });
    };

    let custom_mode = o.style.is_some() || o.title.is_some() || o.lyrics.is_some();
    let prompt = o.lyrics.as_deref().unwrap_or(&request.prompt);

    let mut body = json!({
        "prompt": prompt,
        "customMode": custom_mode,
        "instrumental": o.instrumental,
        "model": request.model,
        "callBackUrl": callback_url.unwrap_or_default(),
    });
    if let Some(style) = &o.style {
        body["style"] = json!(style);
    }
    if let Some(title) = &o.title {
        body["title"] = json!(title);
    }
    for (k, v) in &o.extra {
        body[k.as_str()] = v.clone();
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// Response normalization
// ---------------------------------------------------------------------------

/// Normalize a `recordInfo` payload for an image or video job.
pub fn normalize_job_record(
    kind: MediaKind,
    data: &Value,
) -> Result<ProviderQueryResponse, ProviderError> {
    let state = data
        .get("state")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse("Kie record has no state".into()))?;

    let status = match state {
        "waiting" | "queuing" => TaskStatus::Pending,
        "generating" => TaskStatus::Processing,
        "success" => TaskStatus::Success,
        "fail" => TaskStatus::Failed,
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "Unknown Kie job state '{other}'"
            )))
        }
    };

    let info = TaskInfo {
        state: state.to_string(),
        progress: data.get("progress").and_then(Value::as_f64).map(percent),
        error_message: non_empty_str(data.get("failMsg")),
        raw: data.clone(),
    };

    let result = if status == TaskStatus::Success {
        let urls = result_urls(data)?;
        if urls.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Kie job succeeded without result URLs".into(),
            ));
        }
        let mut result = TaskResult::new(kind, urls.into_iter().map(MediaAsset::remote).collect());
        result.pending_migration = true;
        result.metadata = json!({
            "provider": PROVIDER_NAME,
            "model": data.get("model").cloned().unwrap_or(Value::Null),
        });
        Some(result)
    } else {
        None
    };

    Ok(ProviderQueryResponse {
        status,
        info: Some(info),
        result,
    })
}

/// Normalize a Suno `record-info` payload.
pub fn normalize_music_record(data: &Value) -> Result<ProviderQueryResponse, ProviderError> {
    let state = data
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse("Kie music record has no status".into()))?;

    let status = match state {
        "PENDING" => TaskStatus::Pending,
        "TEXT_SUCCESS" | "FIRST_SUCCESS" => TaskStatus::Processing,
        "SUCCESS" => TaskStatus::Success,
        s if s.ends_with("_FAILED") || s.ends_with("_ERROR") || s.ends_with("_EXCEPTION") => {
            TaskStatus::Failed
        }
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "Unknown Kie music status '{other}'"
            )))
        }
    };

    let info = TaskInfo {
        state: state.to_string(),
        progress: None,
        error_message: non_empty_str(data.get("errorMessage")),
        raw: data.clone(),
    };

    let result = if status == TaskStatus::Success {
        let tracks = data
            .pointer("/response/sunoData")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let assets: Vec<MediaAsset> = tracks
            .iter()
            .filter_map(|track| {
                let url = track.get("audioUrl").and_then(Value::as_str)?;
                let mut asset = MediaAsset::remote(url).with_content_type("audio/mpeg");
                if let Some(image) = track.get("imageUrl").and_then(Value::as_str) {
                    asset = asset.with_thumbnail(image);
                }
                asset.title = non_empty_str(track.get("title"));
                asset.duration_secs = track.get("duration").and_then(Value::as_f64);
                Some(asset)
            })
            .collect();

        if assets.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Kie music task succeeded without tracks".into(),
            ));
        }

        let mut result = TaskResult::new(MediaKind::Music, assets);
        result.pending_migration = true;
        result.metadata = json!({ "provider": PROVIDER_NAME });
        Some(result)
    } else {
        None
    };

    Ok(ProviderQueryResponse {
        status,
        info: Some(info),
        result,
    })
}

/// `resultJson` is a JSON document encoded as a string.
fn result_urls(data: &Value) -> Result<Vec<String>, ProviderError> {
    let parsed = match data.get("resultJson") {
        Some(Value::String(s)) if !s.is_empty() => serde_json::from_str::<Value>(s)
            .map_err(|e| ProviderError::InvalidResponse(format!("Bad Kie resultJson: {e}")))?,
        Some(v @ Value::Object(_)) => v.clone(),
        _ => return Ok(Vec::new()),
    };

    Ok(parsed
        .get("resultUrls")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn percent(p: f64) -> u8 {
    p.clamp(0.0, 100.0).round() as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
