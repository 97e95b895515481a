//! Conversion job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{ErrorContext, JobStatus, ModelError, ModelResult, OptimizationLevel, OutputFormat};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One conversion request spanning one or more output formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Unique job ID
    pub id: JobId,

    /// Client-supplied file name
    pub original_filename: String,

    /// Uploaded source file on local disk
    pub source_path: PathBuf,

    /// Requested formats, first occurrence order, no duplicates
    pub formats: Vec<OutputFormat>,

    /// Keep the audio track in outputs
    pub preserve_audio: bool,

    /// Encoder tier
    pub optimize_level: OptimizationLevel,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Set exactly when the status is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Source size in megabytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size_mb: Option<f64>,

    /// Public URL per uploaded format
    #[serde(default)]
    pub converted_files: BTreeMap<OutputFormat, String>,

    /// Output size per uploaded format, in megabytes
    #[serde(default)]
    pub converted_sizes_mb: BTreeMap<OutputFormat, f64>,

    /// Size reduction per uploaded format, in percent
    #[serde(default)]
    pub compression_ratios: BTreeMap<OutputFormat, f64>,

    /// Formats that failed conversion or upload
    #[serde(default)]
    pub failed_formats: Vec<OutputFormat>,

    /// Human-readable error summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Structured failure contexts
    #[serde(default)]
    pub error_details: Vec<ErrorContext>,
}

impl ConversionJob {
    /// Create a new pending job.
    pub fn new(
        original_filename: impl Into<String>,
        source_path: impl Into<PathBuf>,
        formats: Vec<OutputFormat>,
        preserve_audio: bool,
        optimize_level: OptimizationLevel,
    ) -> ModelResult<Self> {
        let mut unique = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        if unique.is_empty() {
            return Err(ModelError::NoFormats);
        }

        let now = Utc::now();
        Ok(Self {
            id: JobId::new(),
            original_filename: original_filename.into(),
            source_path: source_path.into(),
            formats: unique,
            preserve_audio,
            optimize_level,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            completed_at: None,
            original_size_mb: None,
            converted_files: BTreeMap::new(),
            converted_sizes_mb: BTreeMap::new(),
            compression_ratios: BTreeMap::new(),
            failed_formats: Vec::new(),
            error_message: None,
            error_details: Vec::new(),
        })
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Mark job as processing.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Processing)
    }

    /// Mark job as completed.
    pub fn complete(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Completed)
    }

    /// Mark job as partially completed.
    pub fn partially_complete(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::PartiallyCompleted)?;
        self.add_error(error);
        Ok(())
    }

    /// Mark job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.add_error(error);
        Ok(())
    }

    /// Operator reset back to pending. Clears all outputs and errors.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.updated_at = Utc::now();
        self.completed_at = None;
        self.converted_files.clear();
        self.converted_sizes_mb.clear();
        self.compression_ratios.clear();
        self.failed_formats.clear();
        self.error_message = None;
        self.error_details.clear();
    }

    /// Record a successfully uploaded output.
    pub fn add_converted_file(&mut self, format: OutputFormat, url: impl Into<String>, size_mb: f64) {
        self.converted_files.insert(format, url.into());
        self.converted_sizes_mb.insert(format, size_mb);
        match self.original_size_mb {
            Some(original) if original > 0.0 => {
                self.compression_ratios
                    .insert(format, (1.0 - size_mb / original) * 100.0);
            }
            _ => {
                self.compression_ratios.remove(&format);
            }
        }
        self.failed_formats.retain(|f| *f != format);
        self.updated_at = Utc::now();
    }

    /// Record a format that failed conversion or upload.
    pub fn record_failed_format(&mut self, format: OutputFormat) {
        if !self.failed_formats.contains(&format) && !self.converted_files.contains_key(&format) {
            self.failed_formats.push(format);
        }
        self.updated_at = Utc::now();
    }

    /// Append to the error summary.
    pub fn add_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        if error.is_empty() {
            return;
        }
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, error),
            None => error,
        });
        self.updated_at = Utc::now();
    }

    /// Attach a structured failure context.
    pub fn add_error_detail(&mut self, context: ErrorContext) {
        self.error_details.push(context);
        self.updated_at = Utc::now();
    }

    /// Seconds between creation and completion (or now, while running).
    pub fn processing_time_secs(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds() as f64 / 1000.0
    }

    /// Compression ratio rendered as "x.x%".
    pub fn compression_ratio_label(&self, format: OutputFormat) -> Option<String> {
        self.compression_ratios
            .get(&format)
            .map(|ratio| format!("{:.1}%", ratio))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn job(formats: Vec<OutputFormat>) -> ConversionJob {
        ConversionJob::new(
            "clip.mov",
            "/tmp/video-converter/clip.mov",
            formats,
            true,
            OptimizationLevel::Balanced,
        )
        .unwrap()
    }

    #[test]
    fn test_job_creation() {
        let job = job(vec![OutputFormat::Mp4, OutputFormat::Webm, OutputFormat::Mp4]);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.formats, vec![OutputFormat::Mp4, OutputFormat::Webm]);
        assert!(job.completed_at.is_none());
        assert!(!job.id.as_str().is_empty());
    }

    #[test]
    fn test_job_requires_formats() {
        let result = ConversionJob::new("a.mp4", "/tmp/a.mp4", vec![], true, OptimizationLevel::Fast);
        assert_eq!(result.unwrap_err(), ModelError::NoFormats);
    }

    #[test]
    fn test_job_state_transitions() {
        let mut job = job(vec![OutputFormat::Mp4]);

        assert_err!(job.complete());
        assert_ok!(job.start());
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.completed_at.is_none());

        assert_ok!(job.complete());
        assert!(job.is_terminal());
        assert!(job.completed_at.is_some());

        // Terminal states are sticky
        assert_err!(job.fail("late failure"));
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_fail_from_pending() {
        let mut job = job(vec![OutputFormat::Mp4]);
        assert_ok!(job.fail("source missing"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("source missing"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_reset_clears_outputs() {
        let mut job = job(vec![OutputFormat::Mp4]);
        job.start().unwrap();
        job.add_converted_file(OutputFormat::Mp4, "https://cdn/mp4/clip.mp4", 1.0);
        job.complete().unwrap();

        job.reset();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());
        assert!(job.converted_files.is_empty());
    }

    #[test]
    fn test_compression_ratio() {
        let mut job = job(vec![OutputFormat::Mp4, OutputFormat::Webm]);
        job.original_size_mb = Some(10.0);
        job.add_converted_file(OutputFormat::Mp4, "https://cdn/mp4/clip.mp4", 4.0);
        job.add_converted_file(OutputFormat::Webm, "https://cdn/webm/clip.webm", 12.5);

        assert_eq!(job.compression_ratio_label(OutputFormat::Mp4).as_deref(), Some("60.0%"));
        assert_eq!(job.compression_ratio_label(OutputFormat::Webm).as_deref(), Some("-25.0%"));
        assert_eq!(job.converted_sizes_mb[&OutputFormat::Mp4], 4.0);
    }

    #[test]
    fn test_compression_ratio_without_original_size() {
        let mut job = job(vec![OutputFormat::Mp4]);
        job.add_converted_file(OutputFormat::Mp4, "https://cdn/mp4/clip.mp4", 4.0);
        assert!(job.compression_ratio_label(OutputFormat::Mp4).is_none());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut job = job(vec![OutputFormat::Mp4, OutputFormat::Webm]);
        job.add_error("storage unavailable");
        job.add_error("");
        job.add_error("Failed formats: webm");
        assert_eq!(
            job.error_message.as_deref(),
            Some("storage unavailable; Failed formats: webm")
        );
    }

    #[test]
    fn test_failed_format_not_recorded_after_success() {
        let mut job = job(vec![OutputFormat::Mp4]);
        job.add_converted_file(OutputFormat::Mp4, "u", 1.0);
        job.record_failed_format(OutputFormat::Mp4);
        assert!(job.failed_formats.is_empty());
    }

    #[test]
    fn test_serialized_map_keys() {
        let mut job = job(vec![OutputFormat::Webm]);
        job.add_converted_file(OutputFormat::Webm, "https://cdn/webm/clip.webm", 2.0);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["converted_files"]["webm"], "https://cdn/webm/clip.webm");
        assert_eq!(value["status"], "pending");
    }
}
