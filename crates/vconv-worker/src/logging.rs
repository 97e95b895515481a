//! Structured job logging.
//!
//! Every event emitted while a conversion job runs carries `job_id` and
//! `operation` fields, plus `format` once a logger is narrowed to a single
//! output, so one job can be followed end to end by its ID.

use tracing::{Level, Span};
use vconv_models::{JobId, OutputFormat};

/// Logger bound to one job, and optionally one output format of it.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
    format: Option<OutputFormat>,
}

impl JobLogger {
    /// `operation` names the phase, e.g. "conversion" or "upload".
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
            format: None,
        }
    }

    /// Same job and operation, scoped to `format`.
    pub fn for_format(&self, format: OutputFormat) -> Self {
        Self {
            format: Some(format),
            ..self.clone()
        }
    }

    pub fn log_start(&self, message: &str) {
        self.emit(Level::INFO, "started", message);
    }

    pub fn log_progress(&self, message: &str) {
        self.emit(Level::INFO, "progress", message);
    }

    pub fn log_warning(&self, message: &str) {
        self.emit(Level::WARN, "warning", message);
    }

    pub fn log_error(&self, message: &str) {
        self.emit(Level::ERROR, "error", message);
    }

    pub fn log_completion(&self, message: &str) {
        self.emit(Level::INFO, "completed", message);
    }

    pub fn job_id(&self) -> &str {
        self.job_id.as_str()
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.format
    }

    /// Span wrapping the job's processing future and its conversion tasks.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation,
        )
    }

    fn emit(&self, level: Level, stage: &str, message: &str) {
        let format = self.format.map(|f| f.as_str()).unwrap_or("-");
        // `event!` needs a constant level
        match level {
            Level::ERROR => tracing::error!(
                job_id = %self.job_id, operation = self.operation, format, stage, "{}", message
            ),
            Level::WARN => tracing::warn!(
                job_id = %self.job_id, operation = self.operation, format, stage, "{}", message
            ),
            _ => tracing::info!(
                job_id = %self.job_id, operation = self.operation, format, stage, "{}", message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_scoping() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "conversion");

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.operation(), "conversion");
        assert_eq!(logger.format(), None);

        let webm = logger.for_format(OutputFormat::Webm);
        assert_eq!(webm.format(), Some(OutputFormat::Webm));
        assert_eq!(webm.job_id(), logger.job_id());
    }
}
