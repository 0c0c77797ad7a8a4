//! The provider contract.

use async_trait::async_trait;
use genflow_core::generation::{MediaKind, TaskStatus};
use genflow_core::payload::{GenerationOptions, TaskInfo, TaskResult};

use crate::error::ProviderError;

/// Everything a provider needs to start a job.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub media_kind: MediaKind,
    pub model: String,
    pub scene: String,
    pub prompt: String,
    pub options: GenerationOptions,
}

/// A job accepted by the provider.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    pub external_job_id: String,
    pub raw: serde_json::Value,
}

/// Normalized answer to a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderQueryResponse {
    pub status: TaskStatus,
    pub info: Option<TaskInfo>,
    /// Present once the provider has produced output.
    pub result: Option<TaskResult>,
}

/// Uniform interface over a third-party generation API.
///
/// Implementations perform the remote call and nothing else: they never
/// touch the task store. Every call is bounded by the adapter's own HTTP
/// timeout.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry name, e.g. `"kie"`.
    fn name(&self) -> &str;

    /// Start a job. Fails with [`ProviderError::MissingJobId`] rather than
    /// retrying when the provider does not hand back an id.
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError>;

    /// Ask for the current state of a job.
    async fn query(
        &self,
        external_job_id: &str,
        media_kind: MediaKind,
        model: &str,
    ) -> Result<ProviderQueryResponse, ProviderError>;
}
