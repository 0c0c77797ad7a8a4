//! Storage configuration loaded from the environment.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StorageError;
use crate::local::LocalStorage;
use crate::s3::S3Storage;
use crate::ObjectStorage;

const DEFAULT_LOCAL_DIR: &str = "./storage";
const DEFAULT_LOCAL_PUBLIC_URL: &str = "http://localhost:3000/files";
const DEFAULT_PREFIX: &str = "generations";

/// Which backend to use and where objects become public.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Local { dir: PathBuf, public_url: String },
    S3 { bucket: String, public_url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Leading path segment of every object key.
    pub prefix: String,
}

impl StorageConfig {
    /// Load from the environment.
    ///
    /// | Env var              | Default                       |
    /// |----------------------|-------------------------------|
    /// | `STORAGE_BACKEND`    | `local`                       |
    /// | `STORAGE_LOCAL_DIR`  | `./storage`                   |
    /// | `STORAGE_PUBLIC_URL` | `http://localhost:3000/files` |
    /// | `S3_BUCKET`          | required for `s3`             |
    /// | `S3_PUBLIC_URL`      | required for `s3`             |
    /// | `S3_PREFIX`          | `generations`                 |
    pub fn from_env() -> Result<Self, StorageError> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let backend = match var("STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "local" => StorageBackend::Local {
                dir: PathBuf::from(var("STORAGE_LOCAL_DIR").unwrap_or_else(|| DEFAULT_LOCAL_DIR.into())),
                public_url: var("STORAGE_PUBLIC_URL")
                    .unwrap_or_else(|| DEFAULT_LOCAL_PUBLIC_URL.into()),
            },
            "s3" => StorageBackend::S3 {
                bucket: var("S3_BUCKET")
                    .ok_or_else(|| StorageError::Config("S3_BUCKET must be set".into()))?,
                public_url: var("S3_PUBLIC_URL")
                    .ok_or_else(|| StorageError::Config("S3_PUBLIC_URL must be set".into()))?,
            },
            other => {
                return Err(StorageError::Config(format!(
                    "Unknown STORAGE_BACKEND '{other}'. Must be one of: local, s3"
                )))
            }
        };

        Ok(Self {
            backend,
            prefix: var("S3_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.into()),
        })
    }

    /// Local directory to serve statically, when the local backend is used.
    pub fn local_dir(&self) -> Option<&PathBuf> {
        match &self.backend {
            StorageBackend::Local { dir, .. } => Some(dir),
            StorageBackend::S3 { .. } => None,
        }
    }

    /// Construct the configured backend.
    pub async fn build(&self) -> Arc<dyn ObjectStorage> {
        match &self.backend {
            StorageBackend::Local { dir, public_url } => {
                tracing::info!(dir = %dir.display(), "Using local object storage");
                Arc::new(LocalStorage::new(dir.clone(), public_url.clone()))
            }
            StorageBackend::S3 { bucket, public_url } => {
                tracing::info!(bucket = %bucket, "Using S3 object storage");
                Arc::new(S3Storage::from_env(bucket.clone(), public_url.clone()).await)
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local {
                dir: PathBuf::from(DEFAULT_LOCAL_DIR),
                public_url: DEFAULT_LOCAL_PUBLIC_URL.into(),
            },
            prefix: DEFAULT_PREFIX.into(),
        }
    }
}
