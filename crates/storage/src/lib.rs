//! Owned object storage for generated media.
//!
//! Provider-hosted files expire, so finished assets are copied into a
//! bucket we control. [`ObjectStorage`] abstracts the destination (S3 or a
//! local directory served over HTTP) and [`AssetFetcher`] abstracts the
//! download from the provider.

pub mod config;
pub mod error;
pub mod fetch;
pub mod local;
pub mod s3;

use async_trait::async_trait;

pub use config::StorageConfig;
pub use error::StorageError;
pub use fetch::{AssetFetcher, FetchedAsset, HttpAssetFetcher};
pub use local::LocalStorage;
pub use s3::S3Storage;

/// Destination for migrated media.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object, and
    /// return the public URL.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Public URL of `key` if an object is already stored there.
    async fn find_object(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Public URL for `key`, whether or not it exists.
    fn public_url(&self, key: &str) -> String;
}

/// Join a base URL and an object key with exactly one slash.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}
