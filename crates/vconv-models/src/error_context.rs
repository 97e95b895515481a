//! Structured context captured when a job fails.

use serde::{Deserialize, Serialize};

use crate::MediaProfile;

/// Host resources at the time of failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_count: usize,
    pub memory_available_gb: f64,
    pub cpu_percent: f64,
}

/// Source video characteristics at the time of failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub resolution: String,
    pub duration: f64,
    pub codec: String,
    pub bit_rate: u64,
}

impl From<&MediaProfile> for VideoSnapshot {
    fn from(profile: &MediaProfile) -> Self {
        Self {
            resolution: profile.resolution(),
            duration: profile.duration,
            codec: profile.codec_name.clone(),
            bit_rate: profile.bit_rate,
        }
    }
}

/// Debugging context attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error variant name
    pub error_type: String,
    /// Display form of the error
    pub error_message: String,
    /// Coarse category: validation, video_processing, timeout, storage,
    /// circuit_breaker or general
    pub error_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSnapshot>,
    /// Dependency name for circuit breaker failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// Seconds until the breaker allows a probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<f64>,
}

impl ErrorContext {
    pub fn new(
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        error_category: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            error_category: error_category.into(),
            system: None,
            video: None,
            service_name: None,
            retry_after_secs: None,
        }
    }

    pub fn with_system(mut self, system: Option<SystemSnapshot>) -> Self {
        self.system = system;
        self
    }

    pub fn with_video(mut self, profile: Option<&MediaProfile>) -> Self {
        self.video = profile.map(VideoSnapshot::from);
        self
    }

    pub fn with_breaker(mut self, service_name: impl Into<String>, retry_after_secs: f64) -> Self {
        self.service_name = Some(service_name.into());
        self.retry_after_secs = Some(retry_after_secs);
        self
    }
}
