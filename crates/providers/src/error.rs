//! Errors from the provider layer.

use genflow_core::generation::MediaKind;

/// HTTP statuses treated as a passing provider outage rather than a
/// rejection of the request.
const TRANSIENT_HTTP_STATUSES: &[u16] = &[502, 503, 504];

/// Errors returned by a [`ProviderAdapter`](crate::ProviderAdapter).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or dropped the connection
    /// (connection refused/reset, timeout, gateway errors). The job itself
    /// may be fine; ask again later.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// The provider answered and refused the request.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status or provider-level error code.
        status: u16,
        /// Raw body or provider message for debugging.
        body: String,
    },

    /// Submission was accepted at the HTTP level but carried no job id.
    #[error("Provider returned no job id")]
    MissingJobId,

    /// The response could not be understood.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider '{provider}' does not support {kind} generation")]
    Unsupported { provider: String, kind: MediaKind },

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    /// The HTTP client could not be constructed.
    #[error("Provider client setup failed: {0}")]
    Setup(String),
}

impl ProviderError {
    /// Whether the failure should leave the task untouched and be retried by
    /// a later poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, body: String) -> Self {
        if TRANSIENT_HTTP_STATUSES.contains(&status) {
            Self::Transient(format!("HTTP {status}: {body}"))
        } else {
            Self::Api { status, body }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::InvalidResponse(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_are_transient() {
        assert!(ProviderError::from_status(503, "busy".into()).is_transient());
        assert!(ProviderError::from_status(504, String::new()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = ProviderError::from_status(400, "bad prompt".into());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Provider API error (400): bad prompt");
    }

    #[test]
    fn missing_job_id_is_permanent() {
        assert!(!ProviderError::MissingJobId.is_transient());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        // Port 9 (discard) on loopback is closed in test environments.
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();
        assert!(ProviderError::from(err).is_transient());
    }
}
