//! Shared data models for the video conversion service.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion jobs and their status state machine
//! - Output formats and optimization tiers
//! - Probed media profiles and content-type labels
//! - Structured error contexts attached to failed jobs

pub mod encoding;
pub mod error;
pub mod error_context;
pub mod job;
pub mod job_status;
pub mod media;

// Re-export common types
pub use encoding::{EncodingParams, OptimizationLevel, OutputFormat, INPUT_EXTENSIONS};
pub use error::{ModelError, ModelResult};
pub use error_context::{ErrorContext, SystemSnapshot, VideoSnapshot};
pub use job::{ConversionJob, JobId};
pub use job_status::JobStatus;
pub use media::{ContentType, MediaProfile};
