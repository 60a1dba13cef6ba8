//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// This worker cannot take the job; the dispatcher must look elsewhere.
    /// Not retryable against the same worker.
    #[error("worker is at maximum capacity ({current}/{max})")]
    CapacityExhausted { current: u32, max: u32 },

    #[error("Media error: {0}")]
    Media(#[from] venc_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] venc_storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
