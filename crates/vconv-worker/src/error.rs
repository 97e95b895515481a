//! Worker error types.

use thiserror::Error;
use vconv_models::OutputFormat;

use crate::circuit_breaker::CircuitBreakerError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Conversion to {format} failed: {message}")]
    ConversionFailed { format: OutputFormat, message: String },

    #[error("Conversion to {format} timed out after {timeout_secs}s")]
    ConversionTimeout { format: OutputFormat, timeout_secs: u64 },

    #[error("Resource sampling failed: {0}")]
    ResourceSampling(String),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),

    #[error("Storage error: {0}")]
    Storage(#[from] vconv_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vconv_media::MediaError),

    #[error("Invalid job: {0}")]
    Model(#[from] vconv_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn conversion_failed(format: OutputFormat, msg: impl Into<String>) -> Self {
        Self::ConversionFailed {
            format,
            message: msg.into(),
        }
    }

    pub fn resource_sampling(msg: impl Into<String>) -> Self {
        Self::ResourceSampling(msg.into())
    }

    /// Coarse category recorded in error contexts and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            WorkerError::Model(_) => "validation",
            WorkerError::ConversionTimeout { .. } => "timeout",
            WorkerError::ConversionFailed { .. } | WorkerError::Media(_) => "video_processing",
            WorkerError::Storage(_) => "storage",
            WorkerError::CircuitOpen(_) => "circuit_breaker",
            WorkerError::JobFailed(_) | WorkerError::ResourceSampling(_) | WorkerError::Io(_) => {
                "general"
            }
        }
    }

    /// Short type name recorded in error contexts.
    pub fn error_type(&self) -> &'static str {
        match self {
            WorkerError::JobFailed(_) => "JobFailed",
            WorkerError::ConversionFailed { .. } => "ConversionError",
            WorkerError::ConversionTimeout { .. } => "ConversionTimeout",
            WorkerError::ResourceSampling(_) => "ResourceSamplingError",
            WorkerError::CircuitOpen(_) => "CircuitBreakerOpenError",
            WorkerError::Storage(_) => "StorageError",
            WorkerError::Media(_) => "MediaError",
            WorkerError::Model(_) => "ValidationError",
            WorkerError::Io(_) => "IoError",
        }
    }

    /// Check if error is retryable.
    ///
    /// An open breaker is never retryable: the dependency is known down.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Storage(_) | WorkerError::Io(_))
    }

    /// Check if the error came from an open circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, WorkerError::CircuitOpen(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_categories() {
        let timeout = WorkerError::ConversionTimeout {
            format: OutputFormat::Webm,
            timeout_secs: 90,
        };
        assert_eq!(timeout.category(), "timeout");
        assert_eq!(
            WorkerError::conversion_failed(OutputFormat::Mp4, "boom").category(),
            "video_processing"
        );
        assert_eq!(
            WorkerError::Storage(vconv_storage::StorageError::upload_failed("x")).category(),
            "storage"
        );
        assert_eq!(WorkerError::job_failed("x").category(), "general");
    }

    #[test]
    fn test_circuit_open_not_retryable() {
        let err = WorkerError::from(CircuitBreakerError {
            name: "storage".to_string(),
            retry_after: Duration::from_secs(12),
        });
        assert!(err.is_circuit_open());
        assert!(!err.is_retryable());
        assert_eq!(err.category(), "circuit_breaker");
        assert!(err.to_string().contains("storage"));
    }
}
