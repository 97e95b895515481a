//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A required `R2_*` variable is unset or empty.
    #[error("Storage not configured: {0} is not set")]
    MissingConfig(&'static str),

    /// The local file to upload does not exist. Never reaches the network.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Failed to delete {key}: {message}")]
    DeleteFailed { key: String, message: String },

    #[error("Storage unreachable: {0}")]
    Unreachable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn delete_failed(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeleteFailed {
            key: key.into(),
            message: message.into(),
        }
    }
}
