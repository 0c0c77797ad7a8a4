//! Downloading provider-hosted media.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;

/// Default download timeout. Videos can be large.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Largest asset accepted for migration (1 GiB).
pub const MAX_ASSET_BYTES: u64 = 1024 * 1024 * 1024;

/// Bytes downloaded from a provider.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    /// `Content-Type` reported by the source, if any.
    pub content_type: Option<String>,
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, StorageError>;
}

/// [`AssetFetcher`] over plain HTTP(S).
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: MAX_ASSET_BYTES,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, StorageError> {
        let fetch_err = |message: String| StorageError::Fetch {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {status}")));
        }

        let too_large = |size: u64| StorageError::TooLarge {
            url: url.to_string(),
            size,
            limit: self.max_bytes,
        };

        // The header is only a hint; chunked bodies carry none, so the
        // running total below is what enforces the cap.
        if let Some(size) = response.content_length() {
            if size > self.max_bytes {
                return Err(too_large(size));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let mut bytes = Vec::with_capacity(
            response
                .content_length()
                .map_or(0, |n| n.min(self.max_bytes) as usize),
        );
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
        {
            let received = (bytes.len() + chunk.len()) as u64;
            if received > self.max_bytes {
                return Err(too_large(received));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedAsset {
            bytes,
            content_type,
        })
    }
}
