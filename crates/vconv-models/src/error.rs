//! Model-level errors.

use thiserror::Error;

use crate::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Unsupported output format: {0}")]
    UnknownFormat(String),

    #[error("Unknown optimization level: {0}")]
    UnknownOptimizationLevel(String),

    #[error("No output formats requested")]
    NoFormats,
}

impl ModelError {
    pub fn unknown_format(format: impl Into<String>) -> Self {
        Self::UnknownFormat(format.into())
    }

    pub fn unknown_level(level: impl Into<String>) -> Self {
        Self::UnknownOptimizationLevel(level.into())
    }
}
