//! Storage errors.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Downloading the source asset failed.
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Asset at {url} is {size} bytes, over the {limit} byte limit")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
