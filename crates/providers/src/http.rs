//! Shared JSON-over-HTTP client used by the concrete adapters.
//!
//! Wraps [`reqwest`] with a per-request timeout, bearer authentication and
//! status checking that maps failures onto [`ProviderError`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProviderError;

/// Default upper bound for a single provider request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client bound to one provider's base URL and credentials.
pub struct ProviderHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProviderHttp {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// `POST {base_url}{path}` with a JSON body.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// `GET {base_url}{path}` with query parameters.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ---- private helpers ----

    /// Turn a non-2xx response into a [`ProviderError`] carrying the body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Read a duration-in-seconds environment variable, defaulting to
/// [`DEFAULT_TIMEOUT`] when unset.
///
/// # Panics
///
/// Panics if the variable is set but is not a whole number of seconds.
pub fn timeout_from_env(var: &str) -> Duration {
    timeout_from_value(var, std::env::var(var).ok().as_deref())
}

fn timeout_from_value(var: &str, value: Option<&str>) -> Duration {
    match value {
        None => DEFAULT_TIMEOUT,
        Some(v) => Duration::from_secs(
            v.trim()
                .parse()
                .unwrap_or_else(|_| panic!("{var} must be a valid u64")),
        ),
    }
}
