//! Storage error types.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("No master playlist/manifest found among uploaded files")]
    MasterNotFound,

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }
}
