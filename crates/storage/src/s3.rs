//! S3-backed storage.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::error::StorageError;
use crate::{join_url, ObjectStorage};

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    /// Base URL objects are publicly reachable at (bucket website or CDN).
    public_base_url: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the ambient AWS configuration (env vars,
    /// profile, instance role).
    pub async fn from_env(bucket: String, public_base_url: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(S3Client::new(&config), bucket, public_base_url)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::S3(format!(
                    "put s3://{}/{key} failed: {}",
                    self.bucket,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(bucket = %self.bucket, key, size, "Stored object in S3");
        Ok(self.public_url(key))
    }

    async fn find_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(Some(self.public_url(key))),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(StorageError::S3(format!(
                "head s3://{}/{key} failed: {}",
                self.bucket,
                aws_sdk_s3::error::DisplayErrorContext(&e)
            ))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}
