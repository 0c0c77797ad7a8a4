//! Pipeline error taxonomy.

use genflow_core::error::CoreError;
use genflow_core::types::{Credits, DbId};
use genflow_providers::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad input, rejected before any state is created.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The caller does not own the task.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// The task was never accepted by its provider, so there is nothing to
    /// ask about.
    #[error("Task {0} has no external job id")]
    NotTaskable(DbId),

    /// Another round-trip for the same task is running. Not a failure:
    /// the caller should simply ask again later.
    #[error("A status query for task {0} is already in progress")]
    QueryInProgress(DbId),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    /// Permanent provider failure. Transient failures never surface here.
    #[error(transparent)]
    Provider(ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn task_not_found(id: DbId) -> Self {
        Self::NotFound {
            entity: "GenerationTask",
            id,
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            CoreError::Validation(msg) | CoreError::Conflict(msg) => Self::Validation(msg),
            CoreError::Unauthorized(msg) | CoreError::Forbidden(msg) => Self::Forbidden(msg),
            CoreError::InsufficientCredits {
                required,
                available,
            } => Self::InsufficientCredits {
                required,
                available,
            },
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<ProviderError> for PipelineError {
    /// Unknown providers and unsupported media kinds are input problems;
    /// everything else is the provider's.
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownProvider(_) | ProviderError::Unsupported { .. } => {
                Self::Validation(err.to_string())
            }
            other => Self::Provider(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use genflow_core::generation::MediaKind;

    #[test]
    fn unknown_provider_is_a_validation_error() {
        let err = PipelineError::from(ProviderError::UnknownProvider("acme".into()));
        assert_matches!(err, PipelineError::Validation(msg) if msg.contains("acme"));

        let err = PipelineError::from(ProviderError::Unsupported {
            provider: "replicate".into(),
            kind: MediaKind::Music,
        });
        assert_matches!(err, PipelineError::Validation(_));
    }

    #[test]
    fn api_rejection_stays_a_provider_error() {
        let err = PipelineError::from(ProviderError::Api {
            status: 422,
            body: "bad prompt".into(),
        });
        assert_matches!(err, PipelineError::Provider(ProviderError::Api { status: 422, .. }));
    }

    #[test]
    fn core_errors_keep_their_category() {
        assert_matches!(
            PipelineError::from(CoreError::task_not_found(4)),
            PipelineError::NotFound { id: 4, .. }
        );
        assert_matches!(
            PipelineError::from(CoreError::InsufficientCredits {
                required: 5,
                available: 1
            }),
            PipelineError::InsufficientCredits { required: 5, available: 1 }
        );
    }
}
